//! Paginated listing ingestion
//!
//! [`Ingestor::merge_page`] is the transition function: it folds one fetched
//! page into the session and the destination and names the next fetch.
//! [`Ingestor::run`] drives it against a [`Transport`] until the listing and
//! the session queue are exhausted.

use crate::core::destination::{Destination, DurationResolver, NoopDurationResolver};
use crate::core::state::{LoadingFlags, LoadingState};
use crate::core::track::{is_tombstone, TrackRecord};
use crate::error::TubeError;
use crate::platform::api::{self, ListingItem, ListingPage};
use crate::platform::client::{bearer, Headers, Transport};
use crate::utils::config::{ConfigStore, Settings};
use crate::utils::url::{append_query_param, strip_query_param};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PAGE_TOKEN_PARAM: &str = "pageToken";

/// Why the next fetch happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// A channel resolved to its uploads listing
    RelatedPlaylist,
    /// The page carried a continuation token
    NextPage,
    /// Front of the session queue
    Queued,
}

/// Outcome of merging one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Fetch { url: String, reason: FetchReason },
    Finished,
}

/// Summary handed to the completion continuation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub destination_id: String,
    pub label: String,
    /// Ids inserted during the run, in insertion order
    pub added: Vec<String>,
    pub pages: usize,
}

impl IngestReport {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

pub struct Ingestor {
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    settings: Settings,
    durations: Arc<dyn DurationResolver>,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<ConfigStore>, settings: Settings) -> Self {
        Self {
            transport,
            store,
            settings,
            durations: Arc::new(NoopDurationResolver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_duration_resolver(mut self, durations: Arc<dyn DurationResolver>) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn request_headers(&self) -> Headers {
        match self.settings.access_token.as_deref() {
            Some(token) if !token.is_empty() => vec![bearer(token)],
            _ => Vec::new(),
        }
    }

    /// Fold one page into the session and decide what to fetch next
    pub fn merge_page(
        &self,
        state: &mut LoadingState,
        destination: &dyn Destination,
        page_url: &str,
        body: &[u8],
    ) -> Step {
        match ListingPage::parse(body) {
            Ok(ListingPage::ChannelResolution { uploads_id, title }) => {
                debug!("Channel resolved to uploads listing {}", uploads_id);
                destination.set_display_label(&title);
                state.reference_label = title;
                return Step::Fetch {
                    url: api::playlist_items_url(&uploads_id),
                    reason: FetchReason::RelatedPlaylist,
                };
            }
            Ok(ListingPage::Items {
                items,
                next_page_token,
            }) => {
                self.merge_items(state, destination, &items);

                if let Some(token) = next_page_token.filter(|t| !t.is_empty()) {
                    if self.follows_next_page(state) {
                        let base = strip_query_param(page_url, PAGE_TOKEN_PARAM);
                        return Step::Fetch {
                            url: append_query_param(&base, PAGE_TOKEN_PARAM, &token),
                            reason: FetchReason::NextPage,
                        };
                    }
                    debug!("Not following continuation of {}", page_url);
                }
            }
            Err(e) => warn!("Skipping page {}: {}", page_url, e),
        }

        match state.pending.pop_front() {
            Some(request) => {
                state.apply_override(&request);
                Step::Fetch {
                    url: request.url,
                    reason: FetchReason::Queued,
                }
            }
            None => Step::Finished,
        }
    }

    fn follows_next_page(&self, state: &LoadingState) -> bool {
        if state.flags.contains(LoadingFlags::IGNORE_NEXT_PAGE) {
            return false;
        }
        match self.settings.limit_user_stream {
            Some(cap) => state.added_count() < cap,
            None => true,
        }
    }

    fn merge_items(
        &self,
        state: &mut LoadingState,
        destination: &dyn Destination,
        items: &[ListingItem],
    ) {
        let mut insert_at = state.insert_position();
        let with_artist = state.flags.contains(LoadingFlags::ADD_CHANNEL_TITLE);

        for item in items {
            let Some(title) = item.title() else {
                continue;
            };
            if is_tombstone(title) {
                debug!("Dropping unavailable entry {:?}", title);
                continue;
            }
            let Some(track_id) = item.track_id() else {
                continue;
            };

            if state.known_ids.contains(track_id) {
                if state.skip_known() {
                    insert_at = insert_at.map(|position| position + 1);
                }
                continue;
            }
            if self.store.is_excluded(track_id) {
                debug!("Skipping excluded track {}", track_id);
                continue;
            }

            state.known_ids.insert(track_id.to_string());
            if let Some(playlist_id) = &state.tracked_playlist {
                self.store.add_playlist_item(playlist_id, track_id);
            }

            let record =
                TrackRecord::from_listing(track_id, item, &state.reference_label, with_artist);
            self.store.record_track(record.to_info());

            match destination.insert_item(&record, insert_at) {
                Ok(()) => {
                    state.record_added(track_id);
                    insert_at = insert_at.map(|position| position + 1);
                }
                Err(e) => warn!("Failed to insert {}: {}", track_id, e),
            }
        }
    }

    /// Ingest `url` and every page and queued request that follows it
    ///
    /// `on_finish` runs exactly once, after the configuration is saved and the
    /// duration pass is done. A transport failure or cancellation returns the
    /// error and leaves `on_finish` uncalled.
    pub async fn run<F>(
        &self,
        url: &str,
        destination: Arc<dyn Destination>,
        mut state: LoadingState,
        on_finish: F,
    ) -> Result<IngestReport, TubeError>
    where
        F: FnOnce(&IngestReport) + Send,
    {
        let headers = self.request_headers();
        let mut next_url = url.to_string();
        let mut pages = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TubeError::Cancelled);
            }

            let request_url = api::with_api_key(&next_url, &self.settings.api_key);
            let body = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TubeError::Cancelled),
                body = self.transport.get(&request_url, &headers) => body?,
            };
            pages += 1;

            destination.begin_batch();
            let step = self.merge_page(&mut state, destination.as_ref(), &next_url, &body);
            destination.end_batch();

            match step {
                Step::Fetch { url, reason } => {
                    debug!("Next fetch ({:?}): {}", reason, url);
                    next_url = url;
                }
                Step::Finished => break,
            }
        }

        let report = IngestReport {
            destination_id: destination.id(),
            label: destination.display_label(),
            added: std::mem::take(&mut state.added),
            pages,
        };
        if let Err(e) = self
            .durations
            .resolve(destination.as_ref(), &report.added)
            .await
        {
            warn!("Duration pass failed for {}: {}", report.destination_id, e);
        }
        if let Err(e) = self.store.save().await {
            warn!("Failed to save configuration: {}", e);
        }
        drop(destination);

        info!(
            "Ingested {} new items into {} over {} pages",
            report.added_count(),
            report.destination_id,
            pages
        );
        on_finish(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::destination::MemoryPlaylist;
    use crate::core::durations::ApiDurationResolver;
    use crate::core::state::{CursorOverride, PendingRequest};
    use crate::platform::client::tests::FakeTransport;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const LIST_URL: &str = "https://api.test/playlistItems?playlistId=PL1";

    fn item(id: &str, title: &str) -> String {
        format!(
            r#"{{"snippet":{{"title":"{}","channelTitle":"Chan","resourceId":{{"videoId":"{}"}}}}}}"#,
            title, id
        )
    }

    fn page(items: &[String], token: Option<&str>) -> String {
        match token {
            Some(token) => format!(
                r#"{{"nextPageToken":"{}","items":[{}]}}"#,
                token,
                items.join(",")
            ),
            None => format!(r#"{{"items":[{}]}}"#, items.join(",")),
        }
    }

    fn ingestor(transport: Arc<FakeTransport>) -> (Ingestor, Arc<ConfigStore>) {
        let store = Arc::new(ConfigStore::in_memory());
        let ingestor = Ingestor::new(transport, store.clone(), Settings::default());
        (ingestor, store)
    }

    #[test]
    fn test_known_item_advances_cursor_without_insert() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("YouTube")
            .with_known_ids(["abc".to_string()])
            .with_cursor(3);

        let body = page(&[item("abc", "Known")], None);
        let step = ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(step, Step::Finished);
        assert_eq!(state.insert_cursor, Some(4));
        assert!(playlist.is_empty());
        assert_eq!(state.added_count(), 0);
    }

    #[test]
    fn test_duplicate_ids_inserted_once() {
        let (ingestor, store) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("YouTube");

        let body = page(&[item("v1", "One"), item("v1", "One again")], None);
        ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(playlist.ids(), vec!["v1"]);
        assert_eq!(state.added_count(), 1);
        assert_eq!(store.track_info("v1").unwrap().title, "One");
        assert_eq!(playlist.items()[0].album.as_deref(), Some("YouTube"));
    }

    #[test]
    fn test_excluded_and_tombstoned_items_skipped() {
        let (ingestor, store) = ingestor(Arc::new(FakeTransport::new()));
        store.exclude("bad");
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("").with_cursor(0);

        let body = page(
            &[
                item("bad", "Excluded"),
                item("gone", "Deleted video"),
                item("hidden", "Private video"),
                item("ok", "Fine"),
            ],
            None,
        );
        ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(playlist.ids(), vec!["ok"]);
        assert_eq!(state.insert_cursor, Some(1));
        assert!(!state.known_ids.contains("bad"));
    }

    #[test]
    fn test_inserts_follow_cursor() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::with_items("p", &["x", "known", "y"]);
        let mut state = LoadingState::new("")
            .with_known_ids(playlist.existing_ids())
            .with_cursor(1);

        let body = page(&[item("known", "K"), item("n1", "N1"), item("n2", "N2")], None);
        ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(playlist.ids(), vec!["x", "known", "n1", "n2", "y"]);
        assert_eq!(state.insert_cursor, Some(4));
    }

    #[test]
    fn test_channel_title_as_artist() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("").with_flags(LoadingFlags::ADD_CHANNEL_TITLE);

        let body = page(&[item("v1", "One")], None);
        ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(playlist.items()[0].artist.as_deref(), Some("Chan"));
        assert!(playlist.items()[0].album.is_none());
    }

    #[test]
    fn test_tracked_playlist_items_updated() {
        let (ingestor, store) = ingestor(Arc::new(FakeTransport::new()));
        store.upsert_user_playlist("PL1", "Mine");
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("").with_tracked_playlist("PL1");

        let body = page(&[item("v1", "One")], None);
        ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert!(store.user_playlist("PL1").unwrap().items.contains("v1"));
    }

    #[test]
    fn test_channel_resolution_fetches_uploads() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("YouTube");

        let body = br#"{"items":[{"contentDetails":{"relatedPlaylists":{"uploads":"UU1"}},
            "snippet":{"title":"Chan","localized":{"title":"Channel One"}}}]}"#;
        let step = ingestor.merge_page(&mut state, &playlist, "https://api.test/channels", body);

        assert_eq!(
            step,
            Step::Fetch {
                url: api::playlist_items_url("UU1"),
                reason: FetchReason::RelatedPlaylist,
            }
        );
        assert!(playlist.is_empty());
        assert_eq!(playlist.display_label(), "Channel One");
        assert_eq!(state.reference_label, "Channel One");
    }

    #[test]
    fn test_continuation_replaces_previous_token() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("");

        let body = page(&[item("v1", "One")], Some("NEW"));
        let step = ingestor.merge_page(
            &mut state,
            &playlist,
            "https://api.test/playlistItems?playlistId=PL1&pageToken=OLD",
            body.as_bytes(),
        );

        assert_eq!(
            step,
            Step::Fetch {
                url: "https://api.test/playlistItems?playlistId=PL1&pageToken=NEW".to_string(),
                reason: FetchReason::NextPage,
            }
        );
    }

    #[test]
    fn test_continuation_suppressed_by_flag_and_cap() {
        let store = Arc::new(ConfigStore::in_memory());
        let capped = Ingestor::new(
            Arc::new(FakeTransport::new()),
            store.clone(),
            Settings::default().with_stream_limit(Some(1)),
        );
        let playlist = MemoryPlaylist::new("p");
        let body = page(&[item("v1", "One")], Some("NEXT"));

        let mut state = LoadingState::new("");
        let step = capped.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());
        assert_eq!(step, Step::Finished);

        let (uncapped, _) = ingestor(Arc::new(FakeTransport::new()));
        let mut state = LoadingState::new("").with_flags(LoadingFlags::IGNORE_NEXT_PAGE);
        let step = uncapped.merge_page(&mut state, &MemoryPlaylist::new("q"), LIST_URL, body.as_bytes());
        assert_eq!(step, Step::Finished);
    }

    #[test]
    fn test_queue_popped_with_overrides() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("YouTube").with_cursor(5);
        state.enqueue(
            PendingRequest::new("https://api.test/second")
                .with_label("Second")
                .with_cursor(CursorOverride::At(0)),
        );

        let body = page(&[], None);
        let step = ingestor.merge_page(&mut state, &playlist, LIST_URL, body.as_bytes());

        assert_eq!(
            step,
            Step::Fetch {
                url: "https://api.test/second".to_string(),
                reason: FetchReason::Queued,
            }
        );
        assert_eq!(state.reference_label, "Second");
        assert_eq!(state.insert_cursor, Some(0));
        assert!(state
            .flags
            .contains(LoadingFlags::IGNORE_EXISTING_POSITION | LoadingFlags::UPDATE_ADDITIONAL_POS));
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_malformed_page_consults_queue() {
        let (ingestor, _) = ingestor(Arc::new(FakeTransport::new()));
        let playlist = MemoryPlaylist::new("p");
        let mut state = LoadingState::new("");

        assert_eq!(
            ingestor.merge_page(&mut state, &playlist, LIST_URL, b"<html>oops"),
            Step::Finished
        );

        state.enqueue(PendingRequest::new("https://api.test/next"));
        assert_eq!(
            ingestor.merge_page(&mut state, &playlist, LIST_URL, b"<html>oops"),
            Step::Fetch {
                url: "https://api.test/next".to_string(),
                reason: FetchReason::Queued,
            }
        );
    }

    struct RecordingDurations(Mutex<Vec<(String, Vec<String>)>>);

    #[async_trait]
    impl DurationResolver for RecordingDurations {
        async fn resolve(
            &self,
            destination: &dyn Destination,
            track_ids: &[String],
        ) -> Result<(), TubeError> {
            self.0.lock().push((destination.id(), track_ids.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_walks_channel_pages_and_finishes_once() {
        let transport = Arc::new(FakeTransport::new());
        let channel_url = "https://api.test/channels?forUsername=someone";
        let uploads_url = api::playlist_items_url("UU1");
        let second_url = format!("{}&pageToken=P2", uploads_url);

        transport.respond(
            channel_url,
            r#"{"items":[{"contentDetails":{"relatedPlaylists":{"uploads":"UU1"}},
                "snippet":{"localized":{"title":"Someone"}}}]}"#,
        );
        transport.respond(&uploads_url, &page(&[item("a", "A"), item("b", "B")], Some("P2")));
        transport.respond(&second_url, &page(&[item("b", "B"), item("c", "C")], None));

        let durations = Arc::new(RecordingDurations(Mutex::new(Vec::new())));
        let store = Arc::new(ConfigStore::in_memory());
        let ingestor = Ingestor::new(transport.clone(), store.clone(), Settings::default())
            .with_duration_resolver(durations.clone());
        let playlist = Arc::new(MemoryPlaylist::new("p"));

        let mut finished = 0;
        let report = ingestor
            .run(channel_url, playlist.clone(), LoadingState::new("YouTube"), |report| {
                finished += 1;
                assert_eq!(report.added_count(), 3);
            })
            .await
            .unwrap();

        assert_eq!(finished, 1);
        assert_eq!(report.pages, 3);
        assert_eq!(report.label, "Someone");
        assert_eq!(playlist.ids(), vec!["a", "b", "c"]);
        assert_eq!(playlist.committed_batches(), 3);
        assert_eq!(transport.urls(), vec![channel_url.to_string(), uploads_url, second_url]);
        assert_eq!(
            durations.0.lock().clone(),
            vec![("p".to_string(), vec!["a".to_string(), "b".to_string(), "c".to_string()])]
        );
        assert!(store.track_info("c").is_some());
    }

    #[tokio::test]
    async fn test_run_persists_resolved_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = Arc::new(ConfigStore::load(&path).await.unwrap());

        let transport = Arc::new(FakeTransport::new());
        transport.respond(LIST_URL, &page(&[item("a", "A")], None));
        transport.respond(
            &api::video_durations_url("a"),
            r#"{"items":[{"id":"a","contentDetails":{"duration":"PT1M5S"}}]}"#,
        );

        let durations = ApiDurationResolver::new(transport.clone(), store.clone(), "");
        let ingestor = Ingestor::new(transport, store, Settings::default())
            .with_duration_resolver(Arc::new(durations));
        let playlist = Arc::new(MemoryPlaylist::new("p"));

        ingestor
            .run(LIST_URL, playlist.clone(), LoadingState::new(""), |_| {})
            .await
            .unwrap();

        assert_eq!(playlist.items()[0].duration, Some(65));
        let reloaded = ConfigStore::load(&path).await.unwrap();
        assert_eq!(reloaded.track_info("a").unwrap().duration, Some(65));
    }

    #[tokio::test]
    async fn test_run_attaches_key_and_bearer() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(&format!("{}&key=K", LIST_URL), &page(&[], None));

        let settings = Settings::default().with_api_key("K").with_access_token("tok");
        let ingestor = Ingestor::new(transport.clone(), Arc::new(ConfigStore::in_memory()), settings);

        ingestor
            .run(LIST_URL, Arc::new(MemoryPlaylist::new("p")), LoadingState::new(""), |_| {})
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].headers, vec![bearer("tok")]);
    }

    #[tokio::test]
    async fn test_transport_failure_skips_continuation() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(LIST_URL, &page(&[item("a", "A")], Some("P2")));
        let (ingestor, _) = ingestor(transport.clone());
        let playlist = Arc::new(MemoryPlaylist::new("p"));

        let mut finished = false;
        let result = ingestor
            .run(LIST_URL, playlist.clone(), LoadingState::new(""), |_| finished = true)
            .await;

        assert!(matches!(result, Err(TubeError::HttpStatus { .. })));
        assert!(!finished);
        assert_eq!(playlist.ids(), vec!["a"]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_fetch() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(LIST_URL, &page(&[item("a", "A")], None));
        let (ingestor, _) = ingestor(transport.clone());
        ingestor.cancel_token().cancel();

        let mut finished = false;
        let result = ingestor
            .run(LIST_URL, Arc::new(MemoryPlaylist::new("p")), LoadingState::new(""), |_| {
                finished = true
            })
            .await;

        assert!(matches!(result, Err(TubeError::Cancelled)));
        assert!(!finished);
        assert!(transport.requests().is_empty());
    }
}
