/// Parse the comma-separated tag input of the post form.
///
/// Spaces are removed everywhere (not just trimmed) and empty entries are
/// dropped, so `"a, b ,c"` gives `["a", "b", "c"]` and `""` gives `[]`.
pub fn parse_tags(input: Option<&str>) -> Vec<String> {
    let Some(input) = input else {
        return Vec::new();
    };

    input
        .replace(' ', "")
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
