//! Serde-deserializable types matching Rebrickable API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{CatalogColor, CatalogPart, CatalogSet, ColorInfo, Page, Part, PartInfo};

// ============================================================================
// Pagination envelope shared by all list endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
  #[serde(default)]
  pub count: u32,
  pub next: Option<String>,
  pub previous: Option<String>,
  #[serde(default = "Vec::new")]
  pub results: Vec<T>,
}

impl<T> ApiPage<T> {
  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      count: self.count,
      next: self.next,
      previous: self.previous,
      results: self.results.into_iter().map(f).collect(),
    }
  }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<String>,
}

// ============================================================================
// Sets
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSet {
  pub set_num: String,
  #[serde(default)]
  pub name: String,
  pub year: Option<i32>,
  pub theme_id: Option<u32>,
  #[serde(default)]
  pub num_parts: u32,
  pub set_img_url: Option<String>,
  pub set_url: Option<String>,
  pub last_modified_dt: Option<String>,
}

impl From<ApiSet> for CatalogSet {
  fn from(set: ApiSet) -> Self {
    CatalogSet {
      set_num: set.set_num,
      name: set.name,
      year: set.year,
      theme_id: set.theme_id,
      num_parts: set.num_parts,
      set_img_url: set.set_img_url,
      set_url: set.set_url,
      last_modified: set.last_modified_dt,
    }
  }
}

// ============================================================================
// Parts and colors
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPart {
  pub part_num: String,
  #[serde(default)]
  pub name: String,
  pub part_cat_id: Option<u32>,
  pub part_url: Option<String>,
  pub part_img_url: Option<String>,
}

impl From<ApiPart> for CatalogPart {
  fn from(part: ApiPart) -> Self {
    CatalogPart {
      part_num: part.part_num,
      name: part.name,
      category_id: part.part_cat_id,
      part_url: part.part_url,
      part_img_url: part.part_img_url,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiColor {
  pub id: i32,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub rgb: String,
  #[serde(default)]
  pub is_trans: bool,
}

impl From<ApiColor> for CatalogColor {
  fn from(color: ApiColor) -> Self {
    CatalogColor {
      id: color.id,
      name: color.name,
      rgb: color.rgb,
      is_trans: color.is_trans,
    }
  }
}

/// One line of a set inventory (`/sets/{id}/parts/`).
#[derive(Debug, Deserialize)]
pub struct ApiInventoryPart {
  pub part: Option<ApiPart>,
  pub color: Option<ApiColor>,
  #[serde(default)]
  pub quantity: u32,
  #[serde(default)]
  pub is_spare: bool,
}

impl ApiInventoryPart {
  /// Convert to a domain part. Spares get their own id so they are tracked
  /// separately from regular parts of the same part and color.
  pub fn into_part(self) -> Part {
    let part = self.part.map(|p| PartInfo {
      part_num: p.part_num,
      name: p.name,
      part_img_url: p.part_img_url,
    });
    let color = self.color.map(|c| ColorInfo {
      id: c.id,
      name: c.name,
      rgb: c.rgb,
    });

    let id = Part::line_id(
      part.as_ref().map(|p| p.part_num.as_str()),
      color.as_ref().map(|c| c.id),
      self.is_spare,
    );

    Part {
      id,
      quantity: self.quantity,
      is_spare: self.is_spare,
      part,
      color,
    }
  }
}
