//! Selector-driven parsing of a listing page into candidate articles.

use agg_core::{CandidateArticle, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;
use super::FetchOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryRule {
    /// Entry is malformed without a summary
    Required(&'static str),
    Optional(&'static str),
    /// Missing summary is replaced by the title
    FallbackToTitle(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRules {
    pub container: &'static str,
    pub title: &'static str,
    pub summary: SummaryRule,
    pub link: &'static str,
    pub published: Option<&'static str>,
}

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| Error::Parse(format!("Invalid selector '{}': {:?}", raw, e)))
}

struct CompiledRules {
    container: Selector,
    title: Selector,
    summary: Selector,
    link: Selector,
    published: Option<Selector>,
}

impl CompiledRules {
    fn compile(rules: &ListingRules) -> Result<Self> {
        let summary = match rules.summary {
            SummaryRule::Required(s) | SummaryRule::Optional(s) | SummaryRule::FallbackToTitle(s) => s,
        };
        Ok(Self {
            container: selector(rules.container)?,
            title: selector(rules.title)?,
            summary: selector(summary)?,
            link: selector(rules.link)?,
            published: rules.published.map(selector).transpose()?,
        })
    }
}

pub fn element_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly relative href against the listing page. Only http(s)
/// results are accepted.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Accepts RFC 3339 and the plain date forms news sites print.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn published_at(element: &ElementRef<'_>, selector: &Selector) -> Option<DateTime<Utc>> {
    let el = element.select(selector).next()?;
    let value = el.value();
    value
        .attr("datetime")
        .or_else(|| value.attr("content"))
        .map(str::to_string)
        .or_else(|| Some(el.text().collect::<String>()))
        .and_then(|raw| parse_published(&raw))
}

fn extract_entry(
    element: &ElementRef<'_>,
    rules: &ListingRules,
    compiled: &CompiledRules,
    base: &Url,
    source: &str,
) -> Option<CandidateArticle> {
    let title = element_text(element, &compiled.title)?;
    let url = element
        .select(&compiled.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(base, href))?;

    let summary = element_text(element, &compiled.summary);
    let summary = match rules.summary {
        SummaryRule::Required(_) => Some(summary?),
        SummaryRule::Optional(_) => summary,
        SummaryRule::FallbackToTitle(_) => Some(summary.unwrap_or_else(|| title.clone())),
    };

    Some(CandidateArticle {
        title,
        summary,
        url,
        source: source.to_string(),
        published_at: compiled.published.as_ref().and_then(|s| published_at(element, s)),
    })
}

/// Parse a listing page. Zero matched containers means the page layout is not
/// what the rules expect and is reported as `Error::Parse`.
pub fn parse_listing(
    html: &str,
    base: &Url,
    source: &str,
    rules: &ListingRules,
    max_items: usize,
) -> Result<FetchOutput> {
    let compiled = CompiledRules::compile(rules)?;
    let document = Html::parse_document(html);

    let containers: Vec<ElementRef<'_>> = document.select(&compiled.container).collect();
    if containers.is_empty() {
        return Err(Error::Parse(format!(
            "{}: no listing entries matched '{}'",
            source, rules.container
        )));
    }

    let mut output = FetchOutput::default();
    for element in containers.iter().take(max_items) {
        match extract_entry(element, rules, &compiled, base, source) {
            Some(candidate) => output.candidates.push(candidate),
            None => output.malformed += 1,
        }
    }
    Ok(output)
}
