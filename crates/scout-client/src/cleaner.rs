use std::collections::HashSet;
use std::sync::Arc;

use htmd::HtmlToMarkdown;
use scout_core::error::AppError;
use scout_core::models::CleanedPage;
use scout_core::traits::Cleaner;
use scraper::{Html, Selector};
use url::Url;

/// HTML cleaner built on htmd and scraper.
///
/// Produces Markdown without non-content elements (script, style, nav, etc.)
/// and collects image candidates from `<img>` tags and social meta tags,
/// resolved against the page URL.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
    img: Option<Selector>,
    meta: Option<Selector>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
            img: self.img.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
            img: Selector::parse("img").ok(),
            meta: Selector::parse(
                "meta[property='og:image'], meta[property='og:image:url'], \
                 meta[name='twitter:image'], meta[property='twitter:image']",
            )
            .ok(),
        }
    }

    fn image_candidates(&self, html: &str, base_url: &str) -> Vec<String> {
        let base = Url::parse(base_url).ok();
        let document = Html::parse_document(html);

        let mut raw: Vec<String> = Vec::new();
        if let Some(meta) = &self.meta {
            raw.extend(
                document
                    .select(meta)
                    .filter_map(|el| el.value().attr("content"))
                    .map(str::to_string),
            );
        }
        if let Some(img) = &self.img {
            for el in document.select(img) {
                let attrs = el.value();
                for attr in ["src", "data-src", "data-original", "data-zoom-image"] {
                    if let Some(v) = attrs.attr(attr) {
                        raw.push(v.to_string());
                    }
                }
                if let Some(srcset) = attrs.attr("srcset") {
                    raw.extend(srcset_urls(srcset));
                }
            }
        }

        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|candidate| resolve(base.as_ref(), candidate.trim()))
            .filter(|u| seen.insert(u.clone()))
            .collect()
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// URLs from a `srcset` value, dropping width/density descriptors.
fn srcset_urls(srcset: &str) -> impl Iterator<Item = String> + '_ {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .map(str::to_string)
}

fn resolve(base: Option<&Url>, candidate: &str) -> Option<String> {
    if candidate.is_empty() || candidate.starts_with("data:") {
        return None;
    }
    let url = match base {
        Some(base) => base.join(candidate).ok()?,
        None => Url::parse(candidate).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str, base_url: &str) -> Result<CleanedPage, AppError> {
        let markdown = self
            .converter
            .convert(html)
            .map_err(|e| AppError::CleanerError(e.to_string()))?;

        Ok(CleanedPage {
            markdown,
            image_candidates: self.image_candidates(html, base_url),
        })
    }
}
