//! Orchestration: resolve an aggregator URL down to one chapter, read its
//! metadata, and enumerate its page images. All HTTP goes through the
//! [`Fetcher`] seam; all ranking goes through the selector with a policy
//! value passed per call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info};
use url::Url;

use crate::error::{GrabError, Result};
use crate::fetch::{FetchedPage, Fetcher};
use crate::scrape::{page_image_url, ChapterPage, SeriesPage};
use crate::select::select_best_chapter;
use crate::types::{ChapterInfo, FetchConfig, PageImage, SelectionPolicy, SelectionResult};

const SITE_DOMAIN: &str = "batoto.net";
const CHAPTER_PATH: &str = "/read/";
const SERIES_PATH: &str = "/comic/_/comics/";

/// Series listings change rarely compared to how often a feed run asks for
/// them; an hour matches the site's own update cadence.
const SERIES_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

pub struct Engine<'a> {
    fetcher: &'a dyn Fetcher,
    cfg: FetchConfig,
    series_cache: TimedCache,
}

impl<'a> Engine<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, cfg: FetchConfig) -> Self {
        Self {
            fetcher,
            cfg,
            series_cache: TimedCache::new(SERIES_CACHE_TTL),
        }
    }

    /// Resolves either kind of aggregator URL to one concrete chapter URL.
    ///
    /// Chapter URLs pass through untouched. Series URLs are fetched, scraped
    /// into candidate rows, and run through the selector under `policy`; a
    /// `NotFound` outcome surfaces as [`GrabError::NoChapterFound`] with the
    /// typed reason.
    pub fn resolve_chapter(&self, url: &str, policy: &SelectionPolicy) -> Result<String> {
        let parsed = Url::parse(url).map_err(|_| GrabError::InvalidUrl(url.into()))?;
        if !host_matches(&parsed) {
            return Err(GrabError::InvalidUrl(url.into()));
        }
        if parsed.path().starts_with(CHAPTER_PATH) {
            return Ok(url.to_string());
        }
        if !parsed.path().starts_with(SERIES_PATH) {
            return Err(GrabError::InvalidUrl(url.into()));
        }

        let body = self.series_page_body(url)?;
        let page = SeriesPage::parse(&body)?;
        info!(
            "looking for a chapter of {} among {} rows",
            page.series_name,
            page.chapters.len()
        );

        let policy = with_series_context(policy, &page.series_name);
        match select_best_chapter(&page.chapters, &policy) {
            SelectionResult::Found(chapter) => Ok(chapter.target_url.clone()),
            SelectionResult::NotFound(reason) => Err(GrabError::NoChapterFound(reason)),
        }
    }

    /// Metadata of the chapter a URL lands on.
    pub fn chapter_info(&self, url: &str) -> Result<ChapterInfo> {
        let fetched = self.fetch_chapter(url)?;
        let chapter = ChapterPage::parse(&fetched.body)?;
        info!(
            "{} {}: {} pages",
            chapter.info.series, chapter.info.chapter_name, chapter.info.pages
        );
        Ok(chapter.info)
    }

    /// Every page image of the chapter a URL lands on, in page order.
    ///
    /// The landing page is page one; it is parsed from the already-fetched
    /// body rather than fetched again.
    pub fn page_images(&self, url: &str) -> Result<Vec<PageImage>> {
        let fetched = self.fetch_chapter(url)?;
        let chapter = ChapterPage::parse(&fetched.body)?;
        info!(
            "collecting {} pages of {} {}",
            chapter.info.pages, chapter.info.series, chapter.info.chapter_name
        );

        let first_page_url = format!("{}/1", fetched.final_url.trim_end_matches('/'));
        let mut images = Vec::with_capacity(chapter.page_urls.len());
        for page_url in &chapter.page_urls {
            let src = if *page_url == first_page_url || *page_url == fetched.final_url {
                page_image_url(&fetched.body)?
            } else {
                let page = self.fetcher.fetch(page_url, &self.cfg)?;
                page_image_url(&page.body)?
            };
            images.push(PageImage::from_image_url(&src));
        }
        Ok(images)
    }

    fn fetch_chapter(&self, url: &str) -> Result<FetchedPage> {
        let fetched = self.fetcher.fetch(url, &self.cfg)?;
        let landed = Url::parse(&fetched.final_url)
            .map_err(|_| GrabError::InvalidUrl(fetched.final_url.clone()))?;
        if !landed.path().starts_with(CHAPTER_PATH) {
            return Err(GrabError::NotAChapterPage {
                url: fetched.final_url,
            });
        }
        Ok(fetched)
    }

    fn series_page_body(&self, url: &str) -> Result<String> {
        if let Some(body) = self.series_cache.get(url) {
            debug!("using cached series page for {url}");
            return Ok(body);
        }
        let fetched = self.fetcher.fetch(url, &self.cfg)?;
        let landed = Url::parse(&fetched.final_url)
            .map_err(|_| GrabError::InvalidUrl(fetched.final_url.clone()))?;
        // A redirect away from the listing path means the slug is dead.
        if !landed.path().starts_with(SERIES_PATH) {
            return Err(GrabError::SeriesNotFound { url: url.into() });
        }
        self.series_cache.put(url, fetched.body.clone());
        Ok(fetched.body)
    }
}

fn host_matches(url: &Url) -> bool {
    url.host_str()
        .map(|host| host == SITE_DOMAIN || host.ends_with(&format!(".{SITE_DOMAIN}")))
        .unwrap_or(false)
}

/// The series name a matcher cleans titles against comes from the scraped
/// page itself, not from the caller.
fn with_series_context(policy: &SelectionPolicy, series_name: &str) -> SelectionPolicy {
    let mut policy = policy.clone();
    if let Some(matcher) = policy.matcher.as_mut() {
        matcher.series_name = series_name.to_string();
    }
    policy
}

/// Fetched series pages keyed by URL, dropped after a TTL.
struct TimedCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl TimedCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored, body)) if stored.elapsed() < self.ttl => Some(body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, body: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (Instant::now(), body));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::sequence_identifier;
    use crate::types::{IdentifierMatch, NoMatch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SERIES_URL: &str = "http://www.batoto.net/comic/_/comics/nichijou-r188";

    const SERIES_HTML: &str = r#"
        <html><body>
        <h1 class="ipsType_pagetitle">Nichijou</h1>
        <table class="chapters_list">
          <tr class="row lang_English chapter_row">
            <td><a href="http://www.batoto.net/read/_/1/nichijou_v1_ch1_en">Vol.1 Ch.1</a></td>
            <td>2 days ago</td>
          </tr>
          <tr class="row lang_German chapter_row">
            <td><a href="http://www.batoto.net/read/_/2/nichijou_v1_ch1_de">Vol.1 Ch.1</a></td>
            <td>1 hour ago</td>
          </tr>
          <tr class="row lang_English chapter_row">
            <td><a href="http://www.batoto.net/read/_/3/nichijou_v1_ch2_en">Vol.1 Ch.2</a></td>
            <td>1 day ago</td>
          </tr>
        </table>
        </body></html>"#;

    /// Serves canned pages keyed by URL and counts fetches.
    struct StubFetcher {
        pages: Vec<(String, FetchedPage)>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn serving(pages: &[(&str, &str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, final_url, body)| {
                        (
                            url.to_string(),
                            FetchedPage {
                                final_url: final_url.to_string(),
                                body: body.to_string(),
                            },
                        )
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Fetcher for StubFetcher {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn fetch(&self, url: &str, _cfg: &FetchConfig) -> Result<FetchedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .iter()
                .find(|(key, _)| key == url)
                .map(|(_, page)| page.clone())
                .ok_or(GrabError::Http {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    fn series_stub() -> StubFetcher {
        StubFetcher::serving(&[(SERIES_URL, SERIES_URL, SERIES_HTML)])
    }

    #[test]
    fn chapter_urls_pass_through_without_fetching() {
        let stub = StubFetcher::serving(&[]);
        let engine = Engine::new(&stub, FetchConfig::default());
        let url = "http://www.batoto.net/read/_/215228/bartender_v14_ch106";
        assert_eq!(
            engine
                .resolve_chapter(url, &SelectionPolicy::any_language())
                .unwrap(),
            url
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn foreign_urls_are_rejected() {
        let stub = StubFetcher::serving(&[]);
        let engine = Engine::new(&stub, FetchConfig::default());
        let err = engine
            .resolve_chapter("http://www.google.com", &SelectionPolicy::any_language())
            .unwrap_err();
        assert!(matches!(err, GrabError::InvalidUrl(_)));
    }

    #[test]
    fn series_url_resolves_to_preferred_language_chapter() {
        let stub = series_stub();
        let engine = Engine::new(&stub, FetchConfig::default());
        let policy = SelectionPolicy::from_language_config(Some("german english"));
        let url = engine.resolve_chapter(SERIES_URL, &policy).unwrap();
        assert_eq!(url, "http://www.batoto.net/read/_/2/nichijou_v1_ch1_de");
    }

    #[test]
    fn series_url_with_matcher_resolves_the_named_chapter() {
        let stub = series_stub();
        let engine = Engine::new(&stub, FetchConfig::default());
        let policy = SelectionPolicy::from_language_config(Some("english")).with_matcher(
            IdentifierMatch {
                series_name: String::new(), // filled from the scraped page
                target: "2".into(),
                extract: sequence_identifier(),
            },
        );
        let url = engine.resolve_chapter(SERIES_URL, &policy).unwrap();
        assert_eq!(url, "http://www.batoto.net/read/_/3/nichijou_v1_ch2_en");
    }

    #[test]
    fn unmatched_language_reports_the_reason() {
        let stub = series_stub();
        let engine = Engine::new(&stub, FetchConfig::default());
        let policy = SelectionPolicy::from_language_config(Some("italian"));
        let err = engine.resolve_chapter(SERIES_URL, &policy).unwrap_err();
        assert!(matches!(
            err,
            GrabError::NoChapterFound(NoMatch::NoLanguageMatch)
        ));
    }

    #[test]
    fn series_pages_are_cached_between_resolutions() {
        let stub = series_stub();
        let engine = Engine::new(&stub, FetchConfig::default());
        let policy = SelectionPolicy::any_language();
        engine.resolve_chapter(SERIES_URL, &policy).unwrap();
        engine.resolve_chapter(SERIES_URL, &policy).unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dead_series_slug_is_reported() {
        // The site redirects dead slugs back to the comic index.
        let stub = StubFetcher::serving(&[(
            SERIES_URL,
            "http://www.batoto.net/comic/",
            "<html></html>",
        )]);
        let engine = Engine::new(&stub, FetchConfig::default());
        let err = engine
            .resolve_chapter(SERIES_URL, &SelectionPolicy::any_language())
            .unwrap_err();
        assert!(matches!(err, GrabError::SeriesNotFound { .. }));
    }

    #[test]
    fn timed_cache_expires() {
        let cache = TimedCache::new(Duration::ZERO);
        cache.put("k", "v".into());
        assert_eq!(cache.get("k"), None);

        let cache = TimedCache::new(Duration::from_secs(60));
        cache.put("k", "v".into());
        assert_eq!(cache.get("k"), Some("v".into()));
    }

    #[test]
    fn page_images_reuse_the_landing_page() {
        let chapter_url = "http://www.batoto.net/read/_/9/serie_ch1";
        let page = |img: &str| {
            format!(
                r#"<html><body>
                <div class="moderation_bar"><a href="/s">Serie</a></div>
                <select name="chapter_select"><option selected="selected">Vol.1 Ch.1</option></select>
                <select name="group_select"><option value="http://x/g/English" selected="selected">Group - English</option></select>
                <select name="page_select">
                  <option value="http://www.batoto.net/read/_/9/serie_ch1/1">1</option>
                  <option value="http://www.batoto.net/read/_/9/serie_ch1/2">2</option>
                </select>
                <img id="comic_page" src="{img}" />
                </body></html>"#
            )
        };
        let first = page("http://img.batoto.net/x/img000001.jpg");
        let second = page("http://img.batoto.net/x/img000002.png");
        let stub = StubFetcher::serving(&[
            (chapter_url, chapter_url, &first),
            (
                "http://www.batoto.net/read/_/9/serie_ch1/2",
                "http://www.batoto.net/read/_/9/serie_ch1/2",
                &second,
            ),
        ]);
        let engine = Engine::new(&stub, FetchConfig::default());
        let images = engine.page_images(chapter_url).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].number, "000001");
        assert_eq!(images[1].extension, ".png");
        // Landing page plus one extra page; page 1 was not refetched.
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
