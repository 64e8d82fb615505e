use crate::source::TypeExpr;

/// Exact names treated as numeric identifiers.
const IDENTIFIER_NAMES: &[&str] = &[
    "id",
    "primaryKey",
    "pk",
    "page",
    "pageSize",
    "totalItems",
    "limit",
    "offset",
];

/// Whether a numeric field with this name is emitted as `integer`.
///
/// Matches `id`, names ending in `Id`, `ID` or `_id`, and the fixed pagination
/// names. Case-sensitive.
pub fn is_identifier_like(name: &str) -> bool {
    if IDENTIFIER_NAMES.contains(&name) {
        return true;
    }
    name.len() > 2 && (name.ends_with("Id") || name.ends_with("ID") || name.ends_with("_id"))
}

/// Replace characters not allowed in component names.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Component name for a (possibly generic) type: `Page<User>` → `Page_User`.
pub fn component_name(name: &str, args: &[TypeExpr]) -> String {
    if args.is_empty() {
        return sanitize(name);
    }
    let mut out = sanitize(name);
    for arg in args {
        out.push('_');
        out.push_str(&arg_label(arg));
    }
    out
}

fn arg_label(arg: &TypeExpr) -> String {
    match arg {
        TypeExpr::Reference { name, args } => component_name(name, args),
        TypeExpr::Array { items } => format!("{}Array", arg_label(items)),
        TypeExpr::Primitive { name } => name.as_str().to_string(),
        other => sanitize(&other.to_string()),
    }
}
