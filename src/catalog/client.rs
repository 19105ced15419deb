use color_eyre::{eyre::eyre, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::catalog::api_types::{
  ApiColor, ApiErrorBody, ApiInventoryPart, ApiPage, ApiPart, ApiSet,
};
use crate::catalog::types::{CatalogColor, CatalogPart, CatalogSet, FetchProgress, Page, Part};
use crate::config::CatalogConfig;
use crate::error::CatalogError;

/// Page size used when walking a full set inventory
pub const PARTS_PAGE_SIZE: u32 = 1000;
/// Default page size for set search
pub const SEARCH_PAGE_SIZE: u32 = 20;

/// Rebrickable API client
#[derive(Clone)]
pub struct CatalogClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: Option<String>,
}

impl CatalogClient {
  pub fn new(config: &CatalogConfig, api_key: Option<String>) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid catalog base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Catalog base URL {} cannot be a base", config.base_url));
    }
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_key,
    })
  }

  pub fn set_api_key(&mut self, api_key: Option<String>) {
    self.api_key = api_key;
  }

  pub fn has_api_key(&self) -> bool {
    self.api_key.as_deref().is_some_and(|k| !k.is_empty())
  }

  /// Build `{base}/{segments...}/`. Segments are percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    // Base URLs are checked in `new`, so this always succeeds.
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments).push("");
    }
    url
  }

  /// Issue an authenticated GET and decode the JSON body.
  async fn get<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    query: &[(&str, String)],
  ) -> Result<T, CatalogError> {
    let api_key = self
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or(CatalogError::InvalidKey)?;

    let url = self.endpoint(segments);
    tracing::debug!(%url, ?query, "Catalog request");

    let mut request = self
      .http
      .get(url)
      .header(AUTHORIZATION, format!("key {}", api_key))
      .header(ACCEPT, "application/json");
    if !query.is_empty() {
      request = request.query(query);
    }

    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      return Err(status_error(status, response).await);
    }

    let body = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body).map_err(|e| CatalogError::Api {
      status: status.as_u16(),
      detail: format!("Failed to parse catalog response: {}", e),
    })
  }

  /// Probe the API with a minimal request. Any failure means the key is unusable.
  pub async fn validate_key(&self) -> bool {
    match self
      .get::<ApiPage<ApiColor>>(&["colors"], &[("page_size", "1".to_string())])
      .await
    {
      Ok(_) => true,
      Err(e) => {
        tracing::warn!(error = %e, "API key validation failed");
        false
      }
    }
  }

  /// Get set details, e.g. `75192-1`
  pub async fn get_set(&self, set_num: &str) -> Result<CatalogSet, CatalogError> {
    let set: ApiSet = self.get(&["sets", set_num], &[]).await?;
    Ok(set.into())
  }

  /// Get a single page of a set's inventory
  pub async fn get_set_parts(
    &self,
    set_num: &str,
    page: u32,
    page_size: u32,
  ) -> Result<Page<Part>, CatalogError> {
    let response: ApiPage<ApiInventoryPart> = self
      .get(
        &["sets", set_num, "parts"],
        &[
          ("page", page.to_string()),
          ("page_size", page_size.to_string()),
        ],
      )
      .await?;

    Ok(response.map(ApiInventoryPart::into_part))
  }

  /// Get a set's whole inventory, one page after another, reporting progress
  /// after each page.
  pub async fn get_all_set_parts(
    &self,
    set_num: &str,
    mut on_progress: impl FnMut(FetchProgress),
  ) -> Result<Vec<Part>, CatalogError> {
    let mut all_parts = Vec::new();
    let mut page = 1u32;

    loop {
      let response = self.get_set_parts(set_num, page, PARTS_PAGE_SIZE).await?;
      tracing::debug!(
        set_num,
        page,
        received = response.results.len(),
        total = response.count,
        "Fetched inventory page"
      );

      all_parts.extend(response.results);
      on_progress(FetchProgress::new(all_parts.len() as u32, response.count));

      if response.next.is_none() {
        break;
      }
      page += 1;
    }

    Ok(all_parts)
  }

  /// Get part details
  pub async fn get_part(&self, part_num: &str) -> Result<CatalogPart, CatalogError> {
    let part: ApiPart = self.get(&["parts", part_num], &[]).await?;
    Ok(part.into())
  }

  /// Get color details
  pub async fn get_color(&self, color_id: i32) -> Result<CatalogColor, CatalogError> {
    let color: ApiColor = self.get(&["colors", &color_id.to_string()], &[]).await?;
    Ok(color.into())
  }

  /// Search sets by free text
  pub async fn search_sets(
    &self,
    query: &str,
    page: u32,
    page_size: u32,
  ) -> Result<Page<CatalogSet>, CatalogError> {
    let response: ApiPage<ApiSet> = self
      .get(
        &["sets"],
        &[
          ("search", query.to_string()),
          ("page", page.to_string()),
          ("page_size", page_size.to_string()),
        ],
      )
      .await?;

    Ok(response.map(CatalogSet::from))
  }
}

fn transport_error(e: reqwest::Error) -> CatalogError {
  CatalogError::Network(e.to_string())
}

async fn status_error(status: StatusCode, response: Response) -> CatalogError {
  match status.as_u16() {
    401 | 403 => CatalogError::Unauthorized,
    404 => CatalogError::NotFound,
    429 => CatalogError::RateLimited,
    code if code >= 500 => CatalogError::Server { status: code },
    code => {
      let detail = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .unwrap_or_else(|| format!("API error: {}", code));
      CatalogError::Api {
        status: code,
        detail,
      }
    }
  }
}
