//! HTML-to-data extraction for the aggregator's two page shapes: series
//! listings and chapter reader pages. Pure functions over already-fetched
//! markup; no I/O happens here.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::error::{GrabError, Result};
use crate::types::{ChapterCandidate, ChapterInfo, PageImage};

static SERIES_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1.ipsType_pagetitle").expect("valid selector"));
static CHAPTER_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.chapters_list tr.chapter_row").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static SERIES_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.moderation_bar a").expect("valid selector"));
static GROUP_SELECTED: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"select[name="group_select"] option[selected]"#).expect("valid selector")
});
static CHAPTER_SELECTED: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"select[name="chapter_select"] option[selected]"#).expect("valid selector")
});
static PAGE_OPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"select[name="page_select"] option"#).expect("valid selector")
});
static COMIC_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img#comic_page").expect("valid selector"));

/// Row language tags are carried as `lang_*` classes on the row element.
const LANG_CLASS_PREFIX: &str = "lang_";

/// A parsed series listing page.
#[derive(Debug, Clone)]
pub struct SeriesPage {
    pub series_name: String,
    /// Chapter rows in listing order (newest first on the site, but the
    /// selector does not rely on that).
    pub chapters: Vec<ChapterCandidate>,
}

impl SeriesPage {
    pub fn parse(html: &str) -> Result<Self> {
        let doc = Html::parse_document(html);

        let series_name = doc
            .select(&SERIES_TITLE)
            .next()
            .map(|el| decoded_text(&el))
            .ok_or(GrabError::PageStructure("series page has no title"))?;

        let mut chapters = Vec::new();
        for row in doc.select(&CHAPTER_ROW) {
            let cells: Vec<ElementRef> = row.select(&CELL).collect();
            let (Some(first), Some(last)) = (cells.first(), cells.last()) else {
                debug!("skipping chapter row with no cells");
                continue;
            };
            let raw_title = decoded_text(first);
            let timestamp_text = decoded_text(last);
            let Some(target_url) = row
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                debug!("skipping unlinked chapter row {raw_title:?}");
                continue;
            };
            if raw_title.is_empty() {
                debug!("skipping untitled chapter row {target_url}");
                continue;
            }

            let language_tags: BTreeSet<String> = row
                .value()
                .classes()
                .filter_map(|class| class.strip_prefix(LANG_CLASS_PREFIX))
                .map(String::from)
                .collect();

            chapters.push(ChapterCandidate {
                raw_title,
                language_tags,
                timestamp_text,
                target_url: target_url.to_string(),
            });
        }

        Ok(Self {
            series_name,
            chapters,
        })
    }
}

/// A parsed chapter reader page: metadata plus the per-page reader URLs.
#[derive(Debug, Clone)]
pub struct ChapterPage {
    pub info: ChapterInfo,
    /// Reader URL of every page; each one carries a single `comic_page`
    /// image.
    pub page_urls: Vec<String>,
}

impl ChapterPage {
    pub fn parse(html: &str) -> Result<Self> {
        let doc = Html::parse_document(html);

        let series = doc
            .select(&SERIES_LINK)
            .next()
            .map(|el| decoded_text(&el).replace(':', "-"))
            .ok_or(GrabError::PageStructure("chapter page has no series link"))?;

        let group_option = doc
            .select(&GROUP_SELECTED)
            .next()
            .ok_or(GrabError::PageStructure("chapter page has no group select"))?;
        let language = group_option
            .value()
            .attr("value")
            .and_then(|v| v.rsplit('/').next())
            .ok_or(GrabError::PageStructure("group option has no value"))?
            .to_string();
        // Split on the last separator so groups with " - " in their name
        // stay intact.
        let group_text = decoded_text(&group_option);
        let group = group_text
            .rsplit_once(" - ")
            .map(|(group, _)| group)
            .unwrap_or("")
            .to_string();

        let chapter_label = doc
            .select(&CHAPTER_SELECTED)
            .next()
            .map(|el| decoded_text(&el))
            .ok_or(GrabError::PageStructure("chapter page has no chapter select"))?;
        let (chapter_id, chapter_title) = match chapter_label.split_once(':') {
            Some((id, title)) => (id.trim().to_string(), title.trim().to_string()),
            None => (chapter_label.trim().to_string(), String::new()),
        };
        let (volume_number, chapter_number) = chapter_id
            .split_once("Ch.")
            .map(|(vol, ch)| (vol.replace("Vol.", "").trim().to_string(), ch.trim().to_string()))
            .ok_or(GrabError::PageStructure("chapter label has no Ch. marker"))?;
        let chapter_name = chapter_label.replace(':', "-");

        let page_urls: Vec<String> = doc
            .select(&PAGE_OPTION)
            .filter_map(|opt| opt.value().attr("value"))
            .map(String::from)
            .collect();
        if page_urls.is_empty() {
            return Err(GrabError::PageStructure("chapter page has no page select"));
        }

        Ok(Self {
            info: ChapterInfo {
                series,
                chapter_name,
                chapter_id,
                chapter_title,
                volume_number,
                chapter_number,
                language,
                group,
                pages: page_urls.len(),
            },
            page_urls,
        })
    }
}

/// Pulls the single comic image URL out of a reader page.
pub fn page_image_url(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);
    doc.select(&COMIC_PAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(String::from)
        .ok_or(GrabError::PageStructure("reader page has no comic image"))
}

impl PageImage {
    /// Derives page number and extension from an image URL like
    /// ".../img000001.jpg".
    pub fn from_image_url(url: &str) -> Self {
        let basename = url.rsplit('/').next().unwrap_or(url);
        let filename = basename.replace("img", "");
        let (number, extension) = match filename.rfind('.') {
            Some(dot) => (filename[..dot].to_string(), filename[dot..].to_string()),
            None => (filename.clone(), String::new()),
        };
        Self {
            url: url.to_string(),
            number,
            extension,
        }
    }
}

// Text content with a second entity-decoding pass; titles on the site are
// sometimes double-encoded.
fn decoded_text(el: &ElementRef<'_>) -> String {
    let text = el.text().collect::<String>();
    html_escape::decode_html_entities(text.trim()).to_string()
}
