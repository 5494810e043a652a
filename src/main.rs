use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use node_forge_shader_graph::{
    BlockRegistry, BuildConfig, CompiledProgram, compiler, compiler::validation, config, dsl,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Clone)]
struct Cli {
    graph_json: Option<PathBuf>,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    validate: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            "--graph-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph-json"));
                };
                cli.graph_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--config" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --config"));
                };
                cli.config = Some(PathBuf::from(v));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --outputdir"));
                };
                cli.output_dir = Some(PathBuf::from(v));
                i += 2;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --graph-json <graph.json>, --config <config.json>, --outputdir <dir>, --validate)"
                ));
            }
        }
    }
    Ok(cli)
}

fn write_program(program: &CompiledProgram, output_dir: &Path, stem: &str) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir {}", output_dir.display()))?;
    for (stage, source) in [("vertex", &program.vertex), ("fragment", &program.fragment)] {
        let path = output_dir.join(format!("{stem}.{stage}.wgsl"));
        std::fs::write(&path, source)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[compile] saved: {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    let graph_path = cli
        .graph_json
        .as_deref()
        .ok_or_else(|| anyhow!("--graph-json <graph.json> is required"))?;

    let build_config = match cli.config.as_deref() {
        Some(path) => config::load_config_from_path(path)?,
        None => BuildConfig::embedded()?,
    };
    let registry = BlockRegistry::with_builtin_blocks();
    let mut graph = dsl::load_graph_from_path(graph_path, &registry)?;
    info!(graph = %graph.name, blocks = graph.len(), "loaded node graph");

    let program = compiler::compile(&mut graph, &build_config)?;
    if cli.validate {
        validation::validate_program(&program)?;
        info!("generated WGSL passed validation");
    }

    match cli.output_dir.as_deref() {
        Some(dir) => {
            let stem = graph_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("graph");
            write_program(&program, dir, stem)?;
        }
        None => {
            println!("// ---- vertex ----\n{}", program.vertex);
            println!("// ---- fragment ----\n{}", program.fragment);
        }
    }
    Ok(())
}
