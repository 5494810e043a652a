//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

use super::CompiledProgram;

/// Parse and validate WGSL source code with naga.
///
/// # Returns
/// The parsed naga Module on success, or an error listing the numbered
/// source on failure.
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse failed:\n{}", format_naga_error(source, &e.to_string())))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("WGSL validation failed:\n{}", format_naga_error(source, &format!("{e:?}"))))?;
    Ok(module)
}

/// Validate WGSL and name what generated it in the error.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{context} generated invalid WGSL"))
}

/// Validates both stages of a compiled program.
pub fn validate_program(program: &CompiledProgram) -> Result<()> {
    validate_wgsl_with_context(&program.vertex, "vertex stage")?;
    validate_wgsl_with_context(&program.fragment, "fragment stage")?;
    Ok(())
}

fn format_naga_error(source: &str, error: &str) -> String {
    let mut output = format!("  {error}\n\nGenerated WGSL:\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}
