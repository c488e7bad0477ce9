//! Prompt construction for the generation backend.
//!
//! The preamble and closing instruction form the output contract the model is
//! held to. Bump [`TEMPLATE_VERSION`] whenever either one changes; the digest
//! is logged with each generation request so a changed template is visible.

use crate::GenerationRequestContext;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const TEMPLATE_VERSION: u32 = 1;

/// Literal token the generated document must start with.
pub const DOCTYPE_TOKEN: &str = "<!DOCTYPE html>";

pub const PREAMBLE: &str = r#"You are a web replication assistant. Your job is to generate clean, semantic, self-contained static HTML.

IMPORTANT REQUIREMENTS:
1. The output MUST start with <!DOCTYPE html> followed by a complete HTML document
2. The HTML must include both <head> and <body> sections
3. Use only HTML and inline CSS (either inline on elements or in a <style> block in the <head>)
4. Match the layout, structure, colors, and visual appearance of the provided context as closely as possible
5. Do not use any JavaScript, <script> elements, event handler attributes or other executable code
6. The result must be renderable as a standalone HTML file
7. Do not include any explanations or markdown formatting - return ONLY the HTML code

Example output format:
<!DOCTYPE html>
<html>
<head>
    <title>Page Title</title>
    <style>
        /* Your CSS here */
    </style>
</head>
<body>
    <!-- Your HTML content here -->
</body>
</html>
"#;

pub const CLOSING: &str = r#"
Please generate a clean, modern HTML clone of this website. Focus on:
1. Maintaining the same visual structure and layout
2. Using modern HTML5 semantic elements
3. Implementing responsive design
4. Keeping the document static: no JavaScript of any kind

Remember: Return ONLY the HTML code, starting with <!DOCTYPE html>. Do not include any explanations or markdown formatting."#;

pub const SCREENSHOT_NOTE: &str = "A screenshot of the website is also provided for reference.";

/// Build the generation prompt for `ctx`.
///
/// Deterministic: the same context always yields the same bytes. The
/// screenshot itself is never embedded, only a note that one exists.
pub fn compose(ctx: &GenerationRequestContext<'_>) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + CLOSING.len() + ctx.html.len() + 256);

    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\nHTML Content:\n");
    prompt.push_str(ctx.html);
    prompt.push_str("\n\nCSS Files:\n");
    prompt.push_str(&ctx.css_links.join(", "));
    prompt.push('\n');

    if !ctx.images.is_empty() {
        prompt.push_str("\nImages:\n");
        prompt.push_str(&ctx.images.join(", "));
        prompt.push('\n');
    }

    if ctx.screenshot_base64.is_some() {
        prompt.push('\n');
        prompt.push_str(SCREENSHOT_NOTE);
        prompt.push('\n');
    }

    prompt.push_str(CLOSING);
    prompt
}

/// Hex SHA-256 of the fixed template parts, computed once per process.
pub fn template_digest() -> &'static str {
    static DIGEST: OnceLock<String> = OnceLock::new();
    DIGEST.get_or_init(|| {
        let mut hasher = Sha256::new();
        hasher.update(PREAMBLE.as_bytes());
        hasher.update(SCREENSHOT_NOTE.as_bytes());
        hasher.update(CLOSING.as_bytes());
        hex::encode(hasher.finalize())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(
        html: &'a str,
        css: &'a [String],
        images: &'a [String],
        screenshot: Option<&str>,
    ) -> GenerationRequestContext<'a> {
        GenerationRequestContext {
            html,
            css_links: css,
            images,
            screenshot_base64: screenshot.map(str::to_string),
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let css = vec!["https://a.test/main.css".to_string()];
        let images = vec!["https://a.test/logo.png".to_string()];
        let a = compose(&context("<p>hi</p>", &css, &images, Some("AAAA")));
        let b = compose(&context("<p>hi</p>", &css, &images, Some("AAAA")));
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_sections_appear_in_order() {
        let css = vec!["https://a.test/1.css".to_string(), "https://a.test/2.css".to_string()];
        let images = vec!["https://a.test/logo.png".to_string()];
        let prompt = compose(&context("<main>body</main>", &css, &images, Some("QUJD")));

        let positions: Vec<usize> = [
            "IMPORTANT REQUIREMENTS",
            "HTML Content:\n<main>body</main>",
            "CSS Files:\nhttps://a.test/1.css, https://a.test/2.css",
            "Images:\nhttps://a.test/logo.png",
            SCREENSHOT_NOTE,
            "Remember: Return ONLY the HTML code",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap_or_else(|| panic!("missing {:?}", needle)))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
        assert!(prompt.ends_with(CLOSING));
    }

    #[test]
    fn test_screenshot_bytes_never_embedded() {
        let secret_b64 = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB";
        let prompt = compose(&context("<p></p>", &[], &[], Some(secret_b64)));
        assert!(prompt.contains(SCREENSHOT_NOTE));
        assert!(!prompt.contains(secret_b64));
        assert!(prompt.contains(DOCTYPE_TOKEN));
    }

    #[test]
    fn test_optional_sections_are_omitted() {
        let prompt = compose(&context("<p></p>", &[], &[], None));
        assert!(prompt.contains("CSS Files:\n\n"));
        assert!(!prompt.contains("Images:"));
        assert!(!prompt.contains(SCREENSHOT_NOTE));
        assert!(prompt.contains(DOCTYPE_TOKEN));
    }

    #[test]
    fn test_template_digest_is_stable() {
        let digest = template_digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        // Later calls hand back the cached value
        assert!(std::ptr::eq(digest, template_digest()));
    }
}
