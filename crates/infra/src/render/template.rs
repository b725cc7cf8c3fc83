/// Substitute `{{MARKER}}` placeholders in an HTML template.
///
/// Each pair replaces every occurrence of its marker; markers without a
/// value stay in the output verbatim, values without a marker are ignored.
pub fn render_template(template: &str, values: &[(&str, String)]) -> String {
    let mut rendered = template.to_string();
    for (marker, value) in values {
        rendered = rendered.replace(&format!("{{{{{marker}}}}}"), value);
    }
    rendered
}
