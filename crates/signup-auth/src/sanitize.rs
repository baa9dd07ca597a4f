/// Elements whose content goes along with their tags.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Strip HTML markup from user-supplied text before it is stored or looked up.
///
/// Tags are removed, `<script>` and `<style>` lose their content too, and any
/// stray angle bracket is dropped. The output contains no `<` or `>`, so
/// applying this twice gives the same result as applying it once.
///
/// This strips rather than escapes, so it is lossy: a lone bracket is dropped
/// and leaves its surrounding spaces, so `"a < b"` becomes `"a  b"`. Text that
/// only looks like a tag, such as `"x<y>z"`, loses the bracketed part.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('>') {
            Some(end) => {
                let tag = &after[..end];
                rest = &after[end + 1..];
                if let Some(element) = raw_text_element(tag) {
                    rest = skip_past_closing(rest, element);
                }
            }
            // Unterminated tag: drop the bracket, keep the text.
            None => rest = after,
        }
    }

    out.push_str(rest);
    out.retain(|c| c != '>');
    out
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    let name = tag
        .trim_start()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();

    RAW_TEXT_ELEMENTS
        .into_iter()
        .find(|element| element.eq_ignore_ascii_case(name))
}

fn skip_past_closing<'a>(rest: &'a str, element: &str) -> &'a str {
    // ASCII lowercasing keeps byte offsets aligned with `rest`.
    let lowered = rest.to_ascii_lowercase();
    let Some(pos) = lowered.find(&format!("</{}", element)) else {
        return "";
    };

    let closing = &rest[pos..];
    closing.find('>').map_or("", |end| &closing[end + 1..])
}
