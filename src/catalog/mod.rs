//! Jikan (MyAnimeList) catalog: search, trending and lookup by id.

use crate::error::{AppError, Result};
use crate::http::HttpClient;
use crate::models::MediaRecord;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Fixed page size for search and trending listings.
pub const PAGE_SIZE: u32 = 12;

#[derive(Debug, Deserialize)]
struct JikanListResponse {
    data: Vec<JikanAnime>,
    pagination: Option<JikanPagination>,
}

#[derive(Debug, Deserialize)]
struct JikanSingleResponse {
    data: JikanAnime,
}

#[derive(Debug, Deserialize)]
struct JikanPagination {
    last_visible_page: u32,
    current_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct JikanAnime {
    mal_id: i64,
    title: String,
    title_japanese: Option<String>,
    images: Option<JikanImages>,
    episodes: Option<i32>,
    score: Option<f32>,
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct JikanImages {
    jpg: Option<JikanImageSet>,
}

#[derive(Debug, Deserialize)]
struct JikanImageSet {
    image_url: Option<String>,
    large_image_url: Option<String>,
}

impl From<JikanAnime> for MediaRecord {
    fn from(anime: JikanAnime) -> Self {
        let image_url = anime
            .images
            .and_then(|i| i.jpg)
            .and_then(|jpg| jpg.large_image_url.or(jpg.image_url));
        Self {
            external_id: anime.mal_id,
            title: anime.title,
            title_native: anime.title_japanese,
            image_url,
            total_episodes: anime.episodes,
            score: anime.score,
            year: anime.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub items: Vec<MediaRecord>,
    pub page: u32,
    pub last_page: u32,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        self.page < self.last_page
    }
}

/// Empty results are a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(SearchPage),
    NoResults,
}

impl SearchOutcome {
    fn from_response(response: JikanListResponse, requested_page: u32) -> Self {
        if response.data.is_empty() {
            return Self::NoResults;
        }
        let (page, last_page) = match response.pagination {
            Some(p) => (p.current_page.unwrap_or(requested_page), p.last_visible_page.max(1)),
            None => (requested_page, requested_page),
        };
        Self::Found(SearchPage {
            items: response.data.into_iter().map(Into::into).collect(),
            page,
            last_page,
        })
    }
}

pub struct CatalogClient {
    http: HttpClient,
    base_url: String,
}

impl CatalogClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, page: u32) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Please enter a search term".to_string()));
        }
        let page = page.max(1);
        let url = format!(
            "{}/anime?q={}&page={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            page,
            PAGE_SIZE
        );

        info!("Searching catalog for '{}' (page {})", query, page);
        let response: JikanListResponse = self.http.get_json(&url).await?;
        debug!("Catalog returned {} records", response.data.len());
        Ok(SearchOutcome::from_response(response, page))
    }

    #[instrument(skip(self))]
    pub async fn trending(&self, page: u32) -> Result<SearchOutcome> {
        let page = page.max(1);
        let url = format!(
            "{}/top/anime?filter=airing&page={}&limit={}",
            self.base_url, page, PAGE_SIZE
        );

        info!("Fetching trending anime (page {})", page);
        let response: JikanListResponse = self.http.get_json(&url).await?;
        Ok(SearchOutcome::from_response(response, page))
    }

    #[instrument(skip(self))]
    pub async fn get_anime(&self, external_id: i64) -> Result<MediaRecord> {
        let url = format!("{}/anime/{}", self.base_url, external_id);
        let response: JikanSingleResponse = self.http.get_json(&url).await?;
        Ok(response.data.into())
    }
}

/// Ticket handed out by [`RequestGeneration::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Monotonic request counter. A response is only applied if no newer
/// request was started after it.
#[derive(Debug, Clone, Default)]
pub struct RequestGeneration {
    latest: Arc<AtomicU64>,
}

impl RequestGeneration {
    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Catalog access for a single view: stale responses come back as `None`.
pub struct GuardedCatalog {
    client: Arc<CatalogClient>,
    generation: RequestGeneration,
}

impl GuardedCatalog {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self {
            client,
            generation: RequestGeneration::default(),
        }
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<Option<SearchOutcome>> {
        let ticket = self.generation.begin();
        let outcome = self.client.search(query, page).await;
        self.settle(ticket, outcome)
    }

    pub async fn trending(&self, page: u32) -> Result<Option<SearchOutcome>> {
        let ticket = self.generation.begin();
        let outcome = self.client.trending(page).await;
        self.settle(ticket, outcome)
    }

    fn settle<T>(&self, ticket: RequestTicket, outcome: Result<T>) -> Result<Option<T>> {
        if !self.generation.is_current(ticket) {
            debug!("Discarding stale catalog response {:?}", ticket);
            return Ok(None);
        }
        outcome.map(Some)
    }
}
