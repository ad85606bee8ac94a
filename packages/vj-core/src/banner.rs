//! Banner profile persistence (C14).
//!
//! Grounded in `vj_server.py`'s `_load_banner_profiles`/`_save_banner_profiles`.
//! The JSON index (dj_id -> profile sans pixels) lives at one path; each
//! profile's ARGB pixel grid is a sibling `<dj_id>.argb` file holding
//! `width*height` big-endian `i32`s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::GenericImageView;
use serde::{Deserialize, Serialize};

use crate::error::{VjError, VjResult};

/// A DJ's banner metadata, without its pixel grid (the JSON-persisted shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerProfile {
    pub dj_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub label: Option<String>,
}

/// A banner profile plus its decoded pixel grid (in-memory authority).
#[derive(Debug, Clone)]
pub struct BannerProfileWithPixels {
    pub profile: BannerProfile,
    pub pixels: Vec<i32>,
}

/// Maximum banner dimensions: logos are downsampled into a small grid
/// suitable for a block-built Minecraft banner, not a full image buffer.
const MAX_BANNER_DIM: u32 = 32;

/// In-memory banner store, backed by a JSON index + sibling `.argb` files.
pub struct BannerStore {
    dir: PathBuf,
    profiles: HashMap<String, BannerProfileWithPixels>,
}

impl BannerStore {
    /// Loads the index from `dir/banner_profiles.json`, plus each
    /// referenced `.argb` sibling. A missing file yields an empty store.
    pub fn load(dir: &Path) -> VjResult<Self> {
        let index_path = dir.join("banner_profiles.json");
        let index: HashMap<String, BannerProfile> = match std::fs::read_to_string(&index_path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| VjError::Banner(format!("parsing {}: {e}", index_path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[Banner] No existing banner index at {}", index_path.display());
                HashMap::new()
            }
            Err(e) => return Err(VjError::Banner(format!("{}: {e}", index_path.display()))),
        };

        let mut profiles = HashMap::new();
        for (dj_id, profile) in index {
            let pixels = read_argb(&dir.join(format!("{dj_id}.argb")), profile.width, profile.height)
                .unwrap_or_else(|e| {
                    log::warn!("[Banner] Failed to read pixels for {dj_id}: {e}");
                    vec![0; (profile.width * profile.height) as usize]
                });
            profiles.insert(dj_id.clone(), BannerProfileWithPixels { profile, pixels });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            profiles,
        })
    }

    pub fn get(&self, dj_id: &str) -> Option<&BannerProfileWithPixels> {
        self.profiles.get(dj_id)
    }

    pub fn list(&self) -> Vec<&BannerProfile> {
        self.profiles.values().map(|p| &p.profile).collect()
    }

    /// Sets a profile's pixel grid in memory and schedules a persisted
    /// write. Save failures are logged and never affect in-memory state
    /// (§7 persistence-error policy).
    pub fn set_profile(&mut self, dj_id: String, width: u32, height: u32, pixels: Vec<i32>, label: Option<String>) {
        let profile = BannerProfile {
            dj_id: dj_id.clone(),
            width,
            height,
            label,
        };
        self.profiles.insert(
            dj_id.clone(),
            BannerProfileWithPixels {
                profile,
                pixels: pixels.clone(),
            },
        );
        if let Err(e) = self.save() {
            log::warn!("[Banner] Failed to persist profile for {dj_id}: {e}");
        }
    }

    /// Decodes an uploaded PNG and downsamples it to an ARGB grid no
    /// larger than [`MAX_BANNER_DIM`] on either axis, then stores it.
    pub fn upload_logo(&mut self, dj_id: String, png_bytes: &[u8], label: Option<String>) -> VjResult<()> {
        let img = image::load_from_memory(png_bytes)
            .map_err(|e| VjError::Banner(format!("decoding PNG: {e}")))?;

        let (src_w, src_h) = img.dimensions();
        let scale = (MAX_BANNER_DIM as f64 / src_w.max(src_h) as f64).min(1.0);
        let width = ((src_w as f64 * scale).round() as u32).max(1);
        let height = ((src_h as f64 * scale).round() as u32).max(1);

        let resized = img.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        let rgba = resized.to_rgba8();

        let pixels: Vec<i32> = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                ((a as i32) << 24) | ((r as i32) << 16) | ((g as i32) << 8) | b as i32
            })
            .collect();

        self.set_profile(dj_id, width, height, pixels, label);
        Ok(())
    }

    fn save(&self) -> VjResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| VjError::Banner(format!("creating {}: {e}", self.dir.display())))?;

        let index: HashMap<&str, &BannerProfile> = self
            .profiles
            .iter()
            .map(|(id, p)| (id.as_str(), &p.profile))
            .collect();
        let index_json = serde_json::to_string_pretty(&index)
            .map_err(|e| VjError::Banner(format!("serializing index: {e}")))?;
        std::fs::write(self.dir.join("banner_profiles.json"), index_json)
            .map_err(|e| VjError::Banner(format!("writing index: {e}")))?;

        for (dj_id, entry) in &self.profiles {
            write_argb(&self.dir.join(format!("{dj_id}.argb")), &entry.pixels)?;
        }
        Ok(())
    }
}

fn read_argb(path: &Path, width: u32, height: u32) -> VjResult<Vec<i32>> {
    let bytes = std::fs::read(path).map_err(|e| VjError::Banner(format!("{}: {e}", path.display())))?;
    let expected = (width * height) as usize * 4;
    if bytes.len() != expected {
        return Err(VjError::Banner(format!(
            "{}: expected {expected} bytes, found {}",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_argb(path: &Path, pixels: &[i32]) -> VjResult<()> {
    let mut bytes = Vec::with_capacity(pixels.len() * 4);
    for p in pixels {
        bytes.extend_from_slice(&p.to_be_bytes());
    }
    std::fs::write(path, bytes).map_err(|e| VjError::Banner(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = BannerStore::load(dir.path()).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn set_profile_then_reload_round_trips_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BannerStore::load(dir.path()).unwrap();
        store.set_profile("alice".into(), 2, 1, vec![0xFF000000u32 as i32, 0x00FFFFFFu32 as i32], None);

        let reloaded = BannerStore::load(dir.path()).unwrap();
        let entry = reloaded.get("alice").expect("profile present");
        assert_eq!(entry.profile.width, 2);
        assert_eq!(entry.pixels, vec![0xFF000000u32 as i32, 0x00FFFFFFu32 as i32]);
    }
}
