//! Sitemap ingestion: fetches a `urlset` or `sitemapindex` document and
//! returns the flat list of `<loc>` URLs, recursing into nested indexes.

use std::future::Future;
use std::pin::Pin;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// A failure while fetching or parsing a sitemap document.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// The HTTP request for `url` failed.
    #[error("fetching sitemap {url}: {source}")]
    Fetch {
        /// The sitemap URL that could not be fetched.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The document wasn't well-formed XML.
    #[error("parsing sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// A sitemap index referenced another index past this depth; almost
    /// certainly a cycle, so we give up rather than loop forever.
    #[error("sitemap nesting exceeded {0} levels")]
    TooDeep(u32),
}

const MAX_SITEMAP_DEPTH: u32 = 5;

/// Fetches `url` and returns every page URL it (transitively) names.
/// `sitemapindex` documents are expanded recursively; `urlset` documents
/// contribute their `<loc>` entries directly.
pub async fn fetch_urls_from_sitemap(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<String>, SitemapError> {
    let mut urls = Vec::new();
    collect(client, url, 0, &mut urls).await?;
    Ok(urls)
}

fn collect<'a>(
    client: &'a reqwest::Client,
    url: &'a str,
    depth: u32,
    urls: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<(), SitemapError>> + Send + 'a>> {
    Box::pin(async move {
        if depth > MAX_SITEMAP_DEPTH {
            return Err(SitemapError::TooDeep(MAX_SITEMAP_DEPTH));
        }
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|source| SitemapError::Fetch { url: url.to_string(), source })?;
        let text = response
            .text()
            .await
            .map_err(|source| SitemapError::Fetch { url: url.to_string(), source })?;

        let (is_index, locs) = extract_locs(&text)?;
        if is_index {
            for loc in locs {
                collect(client, &loc, depth + 1, urls).await?;
            }
        } else {
            urls.extend(locs);
        }
        Ok(())
    })
}

fn extract_locs(xml: &str) -> Result<(bool, Vec<String>), SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut seen_root = false;
    let mut is_index = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(tag) => {
                let name = tag.local_name();
                if !seen_root {
                    is_index = name.as_ref() == b"sitemapindex";
                    seen_root = true;
                }
                if name.as_ref() == b"loc" {
                    in_loc = true;
                }
            }
            Event::End(tag) if tag.local_name().as_ref() == b"loc" => in_loc = false,
            Event::Text(text) if in_loc => locs.push(text.unescape()?.into_owned()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((is_index, locs))
}
