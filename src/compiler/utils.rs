//! Formatting and conversion helpers for generated WGSL.

use super::types::ValueType;

/// Format a float as a WGSL f32 literal that always carries a decimal point.
pub fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v:.9}");
    let s = s.trim_end_matches('0');
    if s.ends_with('.') {
        format!("{s}0")
    } else {
        s.to_string()
    }
}

/// Sanitize a string to be a valid WGSL identifier.
pub fn sanitize_wgsl_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    // Identifiers starting with `__` are reserved in WGSL.
    while out.starts_with("__") {
        out.remove(0);
    }
    if out == "_" {
        out.push('v');
    }
    out
}

/// WGSL literal for a constant of type `ty` built from `components`.
///
/// Missing components are zero; extra components are ignored.
pub fn literal(ty: ValueType, components: &[f32]) -> String {
    let get = |i: usize| components.get(i).copied().unwrap_or(0.0);
    match ty {
        ValueType::Int => format!("{}", get(0).round() as i32),
        ValueType::Float | ValueType::AutoDetect | ValueType::BasedOnInput => fmt_f32(get(0)),
        ValueType::Matrix => {
            let parts: Vec<String> = (0..16).map(|i| fmt_f32(get(i))).collect();
            format!("mat4x4f({})", parts.join(", "))
        }
        other => {
            let parts: Vec<String> = (0..other.components()).map(|i| fmt_f32(get(i))).collect();
            format!("{}({})", other.wgsl(), parts.join(", "))
        }
    }
}

/// Convert `expr` of type `from` into type `to`.
///
/// Scalars splat, wider vectors are swizzled down, narrower vectors are
/// padded with zeros (and `1.0` for a fourth component). Matrices only
/// convert to themselves.
pub fn convert(expr: &str, from: ValueType, to: ValueType) -> String {
    if from.is_equivalent(to) || to.is_wildcard() || from.is_wildcard() {
        return expr.to_string();
    }
    match (from, to) {
        (ValueType::Matrix, _) | (_, ValueType::Matrix) => expr.to_string(),
        (ValueType::Int, ValueType::Float) => format!("f32({expr})"),
        (ValueType::Float, ValueType::Int) => format!("i32({expr})"),
        (ValueType::Int, t) => format!("{}(f32({expr}))", t.wgsl()),
        (ValueType::Float, t) => format!("{}({expr})", t.wgsl()),
        (_, ValueType::Float) => format!("{expr}.x"),
        (_, ValueType::Int) => format!("i32({expr}.x)"),
        (f, t) => {
            let (fc, tc) = (f.components(), t.components());
            if tc < fc {
                let swizzle = &"xyzw"[..tc];
                format!("{expr}.{swizzle}")
            } else {
                let mut parts = vec![expr.to_string()];
                for i in fc..tc {
                    parts.push(if i == 3 { "1.0" } else { "0.0" }.to_string());
                }
                format!("{}({})", t.wgsl(), parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_keep_a_decimal_point() {
        assert_eq!(fmt_f32(2.0), "2.0");
        assert_eq!(fmt_f32(0.5), "0.5");
        assert_eq!(fmt_f32(-3.25), "-3.25");
        assert_eq!(fmt_f32(f32::NAN), "0.0");
    }

    #[test]
    fn identifiers_are_sanitized() {
        assert_eq!(sanitize_wgsl_ident("base color"), "base_color");
        assert_eq!(sanitize_wgsl_ident("2d"), "_2d");
        assert_eq!(sanitize_wgsl_ident(""), "_v");
        assert_eq!(sanitize_wgsl_ident("__x"), "_x");
    }

    #[test]
    fn literals_pad_missing_components() {
        assert_eq!(literal(ValueType::Vector3, &[1.0]), "vec3f(1.0, 0.0, 0.0)");
        assert_eq!(literal(ValueType::Int, &[2.6]), "3");
    }

    #[test]
    fn conversions_cover_splat_swizzle_and_padding() {
        assert_eq!(convert("s", ValueType::Float, ValueType::Vector3), "vec3f(s)");
        assert_eq!(convert("v", ValueType::Vector4, ValueType::Vector2), "v.xy");
        assert_eq!(convert("v", ValueType::Vector3, ValueType::Vector4), "vec4f(v, 1.0)");
        assert_eq!(convert("v", ValueType::Vector2, ValueType::Color3), "vec3f(v, 0.0)");
        assert_eq!(convert("c", ValueType::Color3, ValueType::Vector3), "c");
        assert_eq!(convert("v", ValueType::Vector3, ValueType::Float), "v.x");
    }
}
