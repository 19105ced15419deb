use serde::{Deserialize, Serialize};

/// Set details from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSet {
  pub set_num: String,
  pub name: String,
  pub year: Option<i32>,
  pub theme_id: Option<u32>,
  /// Official published part count, spares excluded
  pub num_parts: u32,
  pub set_img_url: Option<String>,
  pub set_url: Option<String>,
  pub last_modified: Option<String>,
}

/// Part details from `/parts/{num}/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPart {
  pub part_num: String,
  pub name: String,
  pub category_id: Option<u32>,
  pub part_url: Option<String>,
  pub part_img_url: Option<String>,
}

/// Color details from `/colors/{id}/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColor {
  pub id: i32,
  pub name: String,
  pub rgb: String,
  pub is_trans: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
  pub part_num: String,
  pub name: String,
  pub part_img_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorInfo {
  pub id: i32,
  pub name: String,
  pub rgb: String,
}

/// One inventory line of a set. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
  /// `{part_num}-{color_id}-{spare|regular}`
  pub id: String,
  pub quantity: u32,
  pub is_spare: bool,
  pub part: Option<PartInfo>,
  pub color: Option<ColorInfo>,
}

impl Part {
  /// Build a line id. Two lines with the same part, color and spare flag
  /// share an id, so the later one wins wherever ids are used as keys.
  pub fn line_id(part_num: Option<&str>, color_id: Option<i32>, is_spare: bool) -> String {
    format!(
      "{}-{}-{}",
      part_num.unwrap_or("unknown"),
      color_id.unwrap_or(0),
      if is_spare { "spare" } else { "regular" }
    )
  }

  pub fn name(&self) -> &str {
    self
      .part
      .as_ref()
      .map(|p| p.name.as_str())
      .unwrap_or("Unknown Part")
  }
}

/// A set together with its full inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetManifest {
  pub set: CatalogSet,
  pub parts: Vec<Part>,
}

/// One page of a list endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub count: u32,
  pub next: Option<String>,
  #[allow(dead_code)]
  pub previous: Option<String>,
  pub results: Vec<T>,
}

/// Reported after every page of a multi-page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
  pub current: u32,
  pub total: u32,
  pub percentage: u32,
}

impl FetchProgress {
  pub fn new(current: u32, total: u32) -> Self {
    let percentage = if total == 0 {
      0
    } else {
      (f64::from(current) * 100.0 / f64::from(total)).round() as u32
    };

    Self {
      current,
      total,
      percentage,
    }
  }
}
