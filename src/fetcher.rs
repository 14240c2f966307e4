use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::settings::Settings;

const PAGE_SIZE: usize = 100;
const COLLECTION_ID_PATTERN: &str = r"^col1[qpzry9x8gf2tvdw0s3jn54khce6mua7l]+$";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("server repeated cursor {0:?}")]
    StalledCursor(String),
}

/// One NFT record. Every field may be absent or null in the API payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Item {
    #[serde(default, deserialize_with = "lenient_string")]
    pub encoded_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner_address_encoded_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner_encoded_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub items: Vec<Item>,
    #[serde(default, deserialize_with = "lenient_string")]
    next: Option<String>,
}

impl Page {
    /// Continuation cursor; an empty string counts as none.
    pub fn cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|c| !c.is_empty())
    }
}

/// Null maps to `None`; non-string scalars are kept in their JSON text form.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn parse_page(body: &str) -> Result<Page, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Everything the fetch loop accumulated, plus the reason it stopped early (if it did).
#[derive(Debug)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub pages: usize,
    pub failure: Option<FetchError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct MintGardenClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl MintGardenClient {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection_id: &str) -> String {
        format!("{}/collections/{}/nfts", self.base_url, collection_id)
    }

    /// Fetch a single page. `cursor` is the `next` token from the previous page.
    pub fn fetch_page(
        &self,
        collection_id: &str,
        require_owner: bool,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let mut query = vec![
            ("require_owner", require_owner.to_string()),
            ("require_price", "false".to_string()),
            ("size", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("page", cursor.to_string()));
        }

        let body = self
            .http
            .get(self.collection_url(collection_id))
            .query(&query)
            .send()?
            .error_for_status()?
            .text()?;
        parse_page(&body)
    }
}

/// Follow the collection's cursor chain one page at a time.
///
/// Stops on an empty page, a missing cursor, a cursor already sent, or the first error.
/// On error the items gathered so far are still returned, alongside the failure.
pub fn fetch_collection(
    client: &MintGardenClient,
    collection_id: &str,
    require_owner: bool,
) -> FetchOutcome {
    let pb = spinner();
    let mut items = Vec::new();
    let mut pages = 0usize;
    let mut cursor: Option<String> = None;
    let mut sent: HashSet<String> = HashSet::new();
    let mut failure = None;

    info!("Fetching collection {} (require_owner={})", collection_id, require_owner);

    loop {
        let page = match client.fetch_page(collection_id, require_owner, cursor.as_deref()) {
            Ok(page) => page,
            Err(e) => {
                warn!("Fetch stopped after {} pages: {}", pages, e);
                failure = Some(e);
                break;
            }
        };
        pages += 1;
        debug!("Page {}: {} items, cursor {:?}", pages, page.items.len(), page.cursor());

        if page.items.is_empty() {
            break;
        }
        let next = page.cursor().map(str::to_string);
        items.extend(page.items);
        pb.set_message(format!("{} pages, {} items", pages, items.len()));

        match next {
            None => break,
            Some(next) if sent.contains(&next) => {
                warn!("Fetch stopped after {} pages: cursor {:?} already fetched", pages, next);
                failure = Some(FetchError::StalledCursor(next));
                break;
            }
            Some(next) => {
                sent.insert(next.clone());
                cursor = Some(next);
            }
        }
    }

    pb.finish_and_clear();
    if failure.is_none() {
        info!("Fetched {} items over {} pages", items.len(), pages);
    }

    FetchOutcome {
        items,
        pages,
        failure,
    }
}

/// True when `id` has the shape of a MintGarden collection id (`col1` + bech32 data).
pub fn is_collection_id(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(COLLECTION_ID_PATTERN).unwrap());
    re.is_match(id)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const COLLECTION: &str = "col1wt3rv8fqmw5ydmlg6fqdpxfrag9rn8taz7uk38daawu7gfzlecrsp049hu";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap()
    }

    fn client_for(server: &ServerGuard) -> MintGardenClient {
        let settings = Settings {
            base_url: server.url(),
            timeout_secs: 5,
        };
        MintGardenClient::new(&settings).unwrap()
    }

    fn nfts_path() -> String {
        format!("/collections/{}/nfts", COLLECTION)
    }

    // First page carries no `page` parameter at all.
    fn first_page(require_owner: bool) -> Matcher {
        Matcher::Regex(format!(
            "^require_owner={}&require_price=false&size=100$",
            require_owner
        ))
    }

    fn cursor_page(cursor: &str) -> Matcher {
        Matcher::Regex(format!("&page={}$", cursor))
    }

    #[test]
    fn follows_cursor_until_last_page() {
        let mut server = Server::new();
        let m1 = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(true))
            .with_status(200)
            .with_body(fixture("page_1"))
            .create();
        let m2 = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-2"))
            .with_status(200)
            .with_body(fixture("page_2_last"))
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 2);
        let ids: Vec<_> = outcome
            .items
            .iter()
            .map(|i| i.encoded_id.as_deref())
            .collect();
        assert_eq!(ids, vec![Some("nft1a"), Some("nft1b"), Some("nft1c"), None]);
        m1.assert();
        m2.assert();
    }

    #[test]
    fn stops_on_empty_page_even_with_cursor() {
        let mut server = Server::new();
        let m1 = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(false))
            .with_status(200)
            .with_body(fixture("page_1"))
            .create();
        let m2 = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-2"))
            .with_status(200)
            .with_body(r#"{"items": [], "next": "cursor-3"}"#)
            .create();
        let m3 = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-3"))
            .expect(0)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, false);

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.items.len(), 2);
        m1.assert();
        m2.assert();
        m3.assert();
    }

    #[test]
    fn stops_when_cursor_missing_or_null() {
        let mut server = Server::new();
        let m = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(true))
            .with_status(200)
            .with_body(r#"{"items": [{"encoded_id": "nft1a"}], "next": null}"#)
            .expect(1)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.items.len(), 1);
        m.assert();
    }

    #[test]
    fn server_error_mid_pagination_keeps_earlier_pages() {
        let mut server = Server::new();
        let _page1 = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(true))
            .with_status(200)
            .with_body(fixture("page_1"))
            .create();
        let _failing = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-2"))
            .with_status(500)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert!(!outcome.is_complete());
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.items.len(), 2);
        assert!(matches!(outcome.failure, Some(FetchError::Transport(_))));
    }

    #[test]
    fn missing_items_key_is_malformed() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", nfts_path().as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"detail": "not found"}"#)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.pages, 0);
        assert!(matches!(outcome.failure, Some(FetchError::Malformed(_))));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", nfts_path().as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>Bad Gateway</html>")
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);
        assert!(matches!(outcome.failure, Some(FetchError::Malformed(_))));
    }

    #[test]
    fn repeated_cursor_is_reported() {
        let mut server = Server::new();
        let _page1 = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(true))
            .with_status(200)
            .with_body(fixture("page_1"))
            .create();
        let looping = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-2"))
            .with_status(200)
            .with_body(r#"{"items": [{"encoded_id": "nft1z"}], "next": "cursor-2"}"#)
            .expect(1)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert_eq!(outcome.items.len(), 3);
        assert!(matches!(
            outcome.failure,
            Some(FetchError::StalledCursor(ref c)) if c == "cursor-2"
        ));
        looping.assert();
    }

    #[test]
    fn cursor_cycle_is_reported() {
        let mut server = Server::new();
        let _page1 = server
            .mock("GET", nfts_path().as_str())
            .match_query(first_page(true))
            .with_status(200)
            .with_body(fixture("page_1"))
            .create();
        let to_cursor_3 = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-2"))
            .with_status(200)
            .with_body(r#"{"items": [{"encoded_id": "nft1y"}], "next": "cursor-3"}"#)
            .expect(1)
            .create();
        let back_to_2 = server
            .mock("GET", nfts_path().as_str())
            .match_query(cursor_page("cursor-3"))
            .with_status(200)
            .with_body(r#"{"items": [{"encoded_id": "nft1z"}], "next": "cursor-2"}"#)
            .expect(1)
            .create();

        let outcome = fetch_collection(&client_for(&server), COLLECTION, true);

        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.items.len(), 4);
        assert!(matches!(
            outcome.failure,
            Some(FetchError::StalledCursor(ref c)) if c == "cursor-2"
        ));
        to_cursor_3.assert();
        back_to_2.assert();
    }

    #[test]
    fn connection_refused_yields_empty_outcome() {
        let settings = Settings {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
        };
        let client = MintGardenClient::new(&settings).unwrap();

        let outcome = fetch_collection(&client, COLLECTION, true);

        assert!(outcome.items.is_empty());
        assert!(matches!(outcome.failure, Some(FetchError::Transport(_))));
    }

    #[test]
    fn item_fields_tolerate_nulls_and_scalars() {
        let page = parse_page(
            r#"{"items": [
                {"encoded_id": 42, "owner_encoded_id": null, "extra": {"a": 1}},
                {}
            ], "next": ""}"#,
        )
        .unwrap();

        assert_eq!(page.items[0].encoded_id.as_deref(), Some("42"));
        assert_eq!(page.items[0].owner_encoded_id, None);
        assert_eq!(page.items[1], Item::default());
        assert_eq!(page.cursor(), None);
    }

    #[test]
    fn collection_id_shape() {
        assert!(is_collection_id(COLLECTION));
        assert!(!is_collection_id("col1"));
        assert!(!is_collection_id("nft1wt3rv8fqmw5y"));
        assert!(!is_collection_id("col1ABC"));
        assert!(!is_collection_id("col1../../etc"));
    }
}
