//! Session cache of HQ renders keyed by (date, wavelength).
//!
//! Entries are filled in two phases: the URL as soon as the generation task
//! completes, the decoded image once it has been downloaded. Nothing is ever
//! evicted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HqKey {
    pub date: NaiveDate,
    pub wavelength: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HqEntry {
    pub source_url: String,
    pub image: Option<Arc<RgbaImage>>,
}

#[derive(Debug, Clone, Default)]
pub struct HqCache {
    entries: HashMap<HqKey, HqEntry>,
}

impl HqCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: NaiveDate, wavelength: u32) -> Option<&HqEntry> {
        self.entries.get(&HqKey { date, wavelength })
    }

    /// Insert or replace the entry. A `None` image keeps any image already
    /// attached for the same URL.
    pub fn put(
        &mut self,
        date: NaiveDate,
        wavelength: u32,
        url: impl Into<String>,
        image: Option<Arc<RgbaImage>>,
    ) {
        let url = url.into();
        let entry = self
            .entries
            .entry(HqKey { date, wavelength })
            .or_insert_with(|| HqEntry {
                source_url: url.clone(),
                image: None,
            });
        if entry.source_url != url {
            entry.source_url = url;
            entry.image = None;
        }
        if image.is_some() {
            entry.image = image;
        }
    }

    /// Attach a downloaded image to the entry for `url`. Returns `false` if
    /// the key was never cached or now points at a different render.
    pub fn attach_image(
        &mut self,
        date: NaiveDate,
        wavelength: u32,
        url: &str,
        image: Arc<RgbaImage>,
    ) -> bool {
        match self.entries.get_mut(&HqKey { date, wavelength }) {
            Some(entry) if entry.source_url == url => {
                entry.image = Some(image);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
