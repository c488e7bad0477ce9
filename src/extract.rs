//! Derives a structured [`PageContext`] from captured markup.
//!
//! Pure function of its inputs: parse the document once, walk it in tree
//! order and collect stylesheet links, image sources, `<style>` and
//! `<script>` text and `<meta>` attributes. Link and image references are
//! resolved against the request URL so every recorded URL is absolute.

use crate::{Error, PageCapture, PageContext, Result};
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use url::Url;

/// Extract a [`PageContext`] from `html`, resolving references against `base_url`.
///
/// Fails with [`Error::ParseError`] only when there is nothing to parse (blank
/// markup) or the base URL itself is not a valid absolute URL.
pub fn extract(html: &str, base_url: &str) -> Result<PageContext> {
    let base = Url::parse(base_url)
        .map_err(|e| Error::ParseError(format!("Invalid base URL '{}': {}", base_url, e)))?;
    extract_with_base(html, &base)
}

/// Same as [`extract`] with an already parsed base URL.
pub fn extract_with_base(html: &str, base: &Url) -> Result<PageContext> {
    if html.trim().is_empty() {
        return Err(Error::ParseError("Captured document is empty".into()));
    }

    let document = Html::parse_document(html);
    let mut ctx = PageContext {
        html: html.to_string(),
        ..Default::default()
    };
    collect(document.root_element(), base, &mut ctx);

    log::debug!(
        "extracted {} stylesheets, {} images, {} style blocks, {} scripts, {} meta tags",
        ctx.css_links.len(),
        ctx.images.len(),
        ctx.inline_styles.len(),
        ctx.scripts.len(),
        ctx.meta_tags.len()
    );

    Ok(ctx)
}

fn collect(root: ElementRef<'_>, base: &Url, ctx: &mut PageContext) {
    for node in root.descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        match element.value().name() {
            "link" if is_stylesheet(&element) => {
                if let Some(href) = resolve(base, element.value().attr("href")) {
                    ctx.css_links.push(href);
                }
            }
            "img" => {
                if let Some(src) = resolve(base, element.value().attr("src")) {
                    ctx.images.push(src);
                }
            }
            "style" => ctx.inline_styles.push(element.text().collect()),
            "script" => ctx.scripts.push(element.text().collect()),
            "meta" => ctx.meta_tags.push(
                element
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            "noscript" => collect_noscript(&element, base, ctx),
            _ => {}
        }
    }
}

// With scripting enabled the parser keeps <noscript> content as raw text,
// which hides the fallback images of lazy-loading pages.
fn collect_noscript(element: &ElementRef<'_>, base: &Url, ctx: &mut PageContext) {
    if element.children().any(|c| c.value().is_element()) {
        return;
    }
    let markup: String = element.text().collect();
    if markup.trim().is_empty() {
        return;
    }
    let fragment = Html::parse_fragment(&markup);
    collect(fragment.root_element(), base, ctx);
}

/// Extract from a capture, carrying its screenshot through unchanged.
pub fn extract_capture(capture: PageCapture, base: &Url) -> Result<PageContext> {
    let mut ctx = extract_with_base(&capture.html, base)?;
    ctx.screenshot = capture.screenshot;
    Ok(ctx)
}

// `rel` is a space separated token list, e.g. "preload stylesheet"
fn is_stylesheet(element: &ElementRef<'_>) -> bool {
    element
        .value()
        .attr("rel")
        .map(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
        .unwrap_or(false)
}

fn resolve(base: &Url, reference: Option<&str>) -> Option<String> {
    let reference = reference?.trim();
    if reference.is_empty() {
        return None;
    }
    match base.join(reference) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            log::debug!("skipping unresolvable reference '{}': {}", reference, e);
            None
        }
    }
}
