//! Literal `{{key}}` template substitution.

use super::model::RecipientRecord;

/// Replace every `{{key}}` in `template` with the matching field of the
/// recipient record. Matching is case-sensitive and literal; placeholders
/// with no matching field are left intact. Non-string fields render via
/// their JSON representation.
pub fn render(template: &str, record: &RecipientRecord) -> String {
    let mut out = template.to_string();
    for (key, value) in record {
        let placeholder = format!("{{{{{key}}}}}");
        if !out.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &replacement);
    }
    out
}
