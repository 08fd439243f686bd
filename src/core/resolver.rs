//! High-level operations over links, account playlists and streams

use crate::core::destination::{Destination, DurationResolver, NoopDurationResolver};
use crate::core::ingest::{IngestReport, Ingestor};
use crate::core::state::{LoadingFlags, LoadingState};
use crate::error::TubeError;
use crate::platform::api;
use crate::platform::cipher::{CipherLoader, DecoderProgram, SignatureDecoder};
use crate::platform::client::{bearer, Headers, HttpClientConfig, HttpTransport, Transport};
use crate::platform::formats::{extract_stream_map, select_stream};
use crate::utils::config::{ConfigStore, MonitorUrl, Settings};
use crate::utils::url::{classify_link, LinkTarget};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Label given to sessions started from a pasted link
pub const DEFAULT_LABEL: &str = "YouTube";

const PLAYLIST_ITEM_KIND: &str = "youtube#playlistItem";

pub struct Resolver {
    settings: Settings,
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    cipher: CipherLoader,
    durations: Arc<dyn DurationResolver>,
    cancel: CancellationToken,
}

impl Resolver {
    /// Resolver over an HTTP transport built from `settings`
    pub fn new(settings: Settings) -> Result<Self, TubeError> {
        let transport = HttpTransport::with_config(HttpClientConfig {
            timeout: settings.timeout,
            max_retries: settings.retries,
            user_agent: settings.user_agent.clone(),
            proxy_url: settings.proxy.clone(),
            requests_per_second: settings.requests_per_second,
        })?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    pub fn with_transport(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let cipher = CipherLoader::new(transport.clone(), Arc::new(SignatureDecoder::new()));
        Self {
            settings,
            transport,
            store: Arc::new(ConfigStore::in_memory()),
            cipher,
            durations: Arc::new(NoopDurationResolver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_duration_resolver(mut self, durations: Arc<dyn DurationResolver>) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<ConfigStore> {
        self.store.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn decoder(&self) -> Arc<SignatureDecoder> {
        self.cipher.decoder()
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.transport.clone(), self.store.clone(), self.settings.clone())
            .with_duration_resolver(self.durations.clone())
            .with_cancel_token(self.cancel.clone())
    }

    fn auth_headers(&self) -> Result<Headers, TubeError> {
        match self.settings.access_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(vec![bearer(token)]),
            _ => Err(TubeError::NotConnected),
        }
    }

    fn listing_url(&self, target: &LinkTarget) -> String {
        let language = &self.settings.language;
        match target {
            LinkTarget::User(name) => api::channel_by_username_url(name, language),
            LinkTarget::Channel(id) => api::channel_by_id_url(id, language),
            LinkTarget::Playlist(id) => api::playlist_items_url(id),
            LinkTarget::Video(id) => api::video_url(id, language),
        }
    }

    /// Record a monitored listing and persist it before any fetch happens
    async fn register_monitor(&self, entry: MonitorUrl) {
        if !self.store.add_monitor_url(entry) {
            return;
        }
        if let Err(e) = self.store.save().await {
            warn!("Failed to save monitored listing: {}", e);
        }
    }

    /// Name the destination after the playlist's owner and title
    async fn label_from_playlist(&self, playlist_id: &str, destination: &dyn Destination) {
        let url = api::with_api_key(
            &api::playlist_info_url(playlist_id, &self.settings.language),
            &self.settings.api_key,
        );
        match self.transport.get(&url, &[]).await {
            Ok(body) => {
                if let Some(name) = api::playlist_display_name(&body) {
                    destination.set_display_label(&name);
                }
            }
            Err(e) => warn!("Playlist metadata for {} unavailable: {}", playlist_id, e),
        }
    }

    /// Ingest everything a service link points at into `destination`
    pub async fn resolve_url(
        &self,
        link: &str,
        destination: Arc<dyn Destination>,
    ) -> Result<IngestReport, TubeError> {
        self.resolve_url_with(link, destination, LoadingFlags::empty())
            .await
    }

    /// [`Resolver::resolve_url`] with explicit session flags
    pub async fn resolve_url_with(
        &self,
        link: &str,
        destination: Arc<dyn Destination>,
        flags: LoadingFlags,
    ) -> Result<IngestReport, TubeError> {
        let target = classify_link(link)?;
        let url = self.listing_url(&target);
        info!("Resolving {} as {:?}", link, target);

        if destination.display_label().is_empty() {
            destination.set_display_label(DEFAULT_LABEL);
        }
        if let LinkTarget::Playlist(playlist_id) = &target {
            self.label_from_playlist(playlist_id, destination.as_ref()).await;
        }

        let state = LoadingState::new(DEFAULT_LABEL)
            .with_flags(flags)
            .with_known_ids(destination.existing_ids());

        if !matches!(target, LinkTarget::Video(_)) {
            self.register_monitor(MonitorUrl {
                url: url.clone(),
                destination_id: destination.id(),
                label: DEFAULT_LABEL.to_string(),
                flags: state.flags,
            })
            .await;
        }

        self.ingestor()
            .run(&url, destination, state, |report| {
                debug!("Resolved {} with {} new items", link, report.added_count())
            })
            .await
    }

    /// Ingest one of the connected account's playlists
    pub async fn load_user_playlist(
        &self,
        playlist_id: &str,
        destination: Arc<dyn Destination>,
    ) -> Result<IngestReport, TubeError> {
        self.auth_headers()?;
        let playlist = self.store.user_playlist(playlist_id).ok_or_else(|| {
            TubeError::Config(format!("Unknown account playlist {}", playlist_id))
        })?;

        let label = format!("{} - {}", self.settings.user_name, playlist.title);
        destination.set_display_label(&label);

        let url = api::playlist_items_url(playlist_id);
        let state = LoadingState::new(&label)
            .with_known_ids(destination.existing_ids())
            .with_tracked_playlist(playlist_id);

        if self.settings.monitor_user_playlists {
            self.register_monitor(MonitorUrl {
                url: url.clone(),
                destination_id: destination.id(),
                label: label.clone(),
                flags: state.flags,
            })
            .await;
        }

        self.ingestor()
            .run(&url, destination, state, |report| {
                debug!("Account playlist {} loaded: {:?}", playlist_id, report)
            })
            .await
    }

    /// Re-ingest every monitored listing into the destination `lookup` returns
    ///
    /// Entries whose destination is gone are skipped. A failing entry is
    /// logged and the rest still run; cancellation stops the whole pass.
    pub async fn refresh_monitored<F>(&self, lookup: F) -> Result<Vec<IngestReport>, TubeError>
    where
        F: Fn(&str) -> Option<Arc<dyn Destination>>,
    {
        let mut reports = Vec::new();

        for monitored in self.store.monitor_urls() {
            let Some(destination) = lookup(&monitored.destination_id) else {
                debug!("No destination {} for {}", monitored.destination_id, monitored.url);
                continue;
            };

            let state = LoadingState::new(&monitored.label)
                .with_flags(monitored.flags)
                .with_known_ids(destination.existing_ids());

            match self
                .ingestor()
                .run(&monitored.url, destination, state, |_| {})
                .await
            {
                Ok(report) => reports.push(report),
                Err(TubeError::Cancelled) => return Err(TubeError::Cancelled),
                Err(e) => warn!("Refreshing {} failed: {}", monitored.url, e),
            }
        }

        Ok(reports)
    }

    /// Add a track to an account playlist; `Ok(false)` when the service refused
    ///
    /// Destinations mirroring the playlist are not touched here; callers pick
    /// up the new item with [`Resolver::refresh_monitored`].
    pub async fn add_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<bool, TubeError> {
        let mut headers = self.auth_headers()?;
        headers.push(("Content-Type".to_string(), "application/json".to_string()));

        let body = serde_json::to_vec(&api::playlist_insert_body(playlist_id, track_id))?;
        let response = self
            .transport
            .post(&api::playlist_insert_url(), &headers, body)
            .await?;

        if !String::from_utf8_lossy(&response).contains(PLAYLIST_ITEM_KIND) {
            warn!("Adding {} to {} was not acknowledged", track_id, playlist_id);
            return Ok(false);
        }

        self.store.add_playlist_item(playlist_id, track_id);
        self.store.save().await?;
        Ok(true)
    }

    /// Remove a track from an account playlist and from its local copy
    pub async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
        destination: Option<Arc<dyn Destination>>,
    ) -> Result<bool, TubeError> {
        let headers = self.auth_headers()?;

        let lookup = self
            .transport
            .get(&api::playlist_membership_url(playlist_id, track_id), &headers)
            .await?;
        let Some(membership_id) = api::first_item_id(&lookup) else {
            debug!("{} is not a member of {}", track_id, playlist_id);
            return Ok(false);
        };

        let mut delete_headers = headers;
        delete_headers.push(("X-HTTP-Method-Override".to_string(), "DELETE".to_string()));
        let response = self
            .transport
            .post(
                &api::playlist_item_delete_url(&membership_id),
                &delete_headers,
                Vec::new(),
            )
            .await?;

        if !String::from_utf8_lossy(&response).trim().is_empty() {
            warn!("Removing {} from {} was not acknowledged", track_id, playlist_id);
            return Ok(false);
        }

        self.store.remove_playlist_item(playlist_id, track_id);
        self.store.save().await?;
        if let Some(destination) = destination {
            destination.remove_item(track_id);
        }
        Ok(true)
    }

    /// Refresh the shared signature program from the current player script
    pub async fn load_signature_decoder(&self) -> Result<Arc<DecoderProgram>, TubeError> {
        self.cipher.refresh().await
    }

    /// Best playable stream URL of a video, `None` when it has no streams
    pub async fn stream_url(&self, video_id: &str) -> Result<Option<String>, TubeError> {
        let body = self.transport.get(&api::video_info_url(video_id), &[]).await?;
        let body = String::from_utf8_lossy(&body);

        let Some(stream_map) = extract_stream_map(&body) else {
            debug!("No stream map for {}", video_id);
            return Ok(None);
        };
        let program = self.cipher.decoder().snapshot();
        Ok(select_stream(&stream_map, program.as_deref()))
    }
}
