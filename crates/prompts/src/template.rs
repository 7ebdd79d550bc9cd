use serde_json::Value;

/// Minimal recursive-descent substitution over `serde_json::Value` variable
/// maps: `{{var}}`, `{{a.b}}`, and one level of `{{#if X}}...{{else}}...{{/if}}`
/// (§4.3). Not a full templating engine — the teacher's own prompt assembly
/// (`agent_loop/prompt.rs`, `state_formatter.rs`) hand-rolls string building
/// rather than pulling in a template crate, and this follows the same idiom.
pub fn render(template: &str, vars: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            break;
        };
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(cond) = tag.strip_prefix("#if ") {
            let (true_branch, false_branch, remainder) = split_if_block(rest);
            let chosen = if is_truthy(lookup(vars, cond.trim())) { true_branch } else { false_branch };
            out.push_str(&render(chosen, vars));
            rest = remainder;
            continue;
        }

        out.push_str(&value_to_string(lookup(vars, tag)));
    }
    out.push_str(rest);
    out
}

fn split_if_block(rest: &str) -> (&str, &str, &str) {
    let end_tag = "{{/if}}";
    let else_tag = "{{else}}";
    let Some(end_idx) = rest.find(end_tag) else {
        return (rest, "", "");
    };
    let body = &rest[..end_idx];
    let remainder = &rest[end_idx + end_tag.len()..];
    match body.find(else_tag) {
        Some(else_idx) => (&body[..else_idx], &body[else_idx + else_tag.len()..], remainder),
        None => (body, "", remainder),
    }
}

fn lookup<'a>(vars: &'a Value, path: &str) -> &'a Value {
    let mut current = vars;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return &Value::Null,
        }
    }
    current
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_flat_and_nested_variables() {
        let vars = json!({"name": "world", "state": {"url": "https://x.test"}});
        assert_eq!(render("hello {{name}} at {{state.url}}", &vars), "hello world at https://x.test");
    }

    #[test]
    fn missing_variables_render_empty() {
        let vars = json!({});
        assert_eq!(render("[{{missing}}]", &vars), "[]");
    }

    #[test]
    fn if_else_selects_by_truthiness() {
        let tpl = "{{#if flag}}yes{{else}}no{{/if}}";
        assert_eq!(render(tpl, &json!({"flag": true})), "yes");
        assert_eq!(render(tpl, &json!({"flag": false})), "no");
        assert_eq!(render(tpl, &json!({})), "no");
    }

    #[test]
    fn if_without_else_renders_empty_on_false() {
        let tpl = "before{{#if flag}}middle{{/if}}after";
        assert_eq!(render(tpl, &json!({"flag": false})), "beforeafter");
    }
}
