//! Photos captured during this session, in capture order.

use log::debug;

use crate::photo::CapturedImage;

/// What changed in the gallery.
#[derive(Debug)]
pub enum GalleryChange<'a> {
    Appended {
        index: usize,
        image: &'a CapturedImage,
    },
    Removed {
        index: usize,
    },
    Cleared,
}

type Observer = Box<dyn FnMut(&GalleryChange<'_>)>;

/// Observable list of captured images. Lives on the UI thread.
#[derive(Default)]
pub struct Gallery {
    images: Vec<CapturedImage>,
    observers: Vec<Observer>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observers run synchronously after each change.
    pub fn subscribe(&mut self, observer: impl FnMut(&GalleryChange<'_>) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Add a capture at the end and return its index.
    pub fn append(&mut self, image: CapturedImage) -> usize {
        let index = self.images.len();
        self.images.push(image);
        debug!("gallery: {} photo(s)", self.images.len());
        let change = GalleryChange::Appended {
            index,
            image: &self.images[index],
        };
        notify(&mut self.observers, &change);
        index
    }

    /// Drop an entry from memory. Stored files are left alone.
    pub fn remove(&mut self, index: usize) -> Option<CapturedImage> {
        if index >= self.images.len() {
            return None;
        }
        let image = self.images.remove(index);
        notify(&mut self.observers, &GalleryChange::Removed { index });
        Some(image)
    }

    pub fn clear(&mut self) {
        self.images.clear();
        notify(&mut self.observers, &GalleryChange::Cleared);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CapturedImage> {
        self.images.get(index)
    }

    pub fn latest(&self) -> Option<&CapturedImage> {
        self.images.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedImage> {
        self.images.iter()
    }
}

fn notify(observers: &mut [Observer], change: &GalleryChange<'_>) {
    for observer in observers.iter_mut() {
        observer(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{camera::Facing, photo::RawCapture};
    use image::RgbaImage;
    use std::{cell::RefCell, rc::Rc};

    fn photo(at: i64) -> CapturedImage {
        CapturedImage::from_raw(RawCapture::new(RgbaImage::new(2, 2), 0), Facing::Back, at).unwrap()
    }

    #[test]
    fn append_keeps_capture_order() {
        let mut gallery = Gallery::new();
        assert_eq!(gallery.append(photo(1)), 0);
        assert_eq!(gallery.append(photo(2)), 1);
        let order: Vec<_> = gallery.iter().map(|p| p.captured_at_millis()).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(gallery.latest().unwrap().captured_at_millis(), 2);
    }

    #[test]
    fn observers_see_every_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut gallery = Gallery::new();
        let log = seen.clone();
        gallery.subscribe(move |change| {
            let entry = match change {
                GalleryChange::Appended { index, image } => {
                    format!("+{index}@{}", image.captured_at_millis())
                }
                GalleryChange::Removed { index } => format!("-{index}"),
                GalleryChange::Cleared => "clear".to_string(),
            };
            log.borrow_mut().push(entry);
        });

        gallery.append(photo(10));
        gallery.append(photo(11));
        gallery.remove(0);
        gallery.clear();

        assert_eq!(*seen.borrow(), vec!["+0@10", "+1@11", "-0", "clear"]);
        assert!(gallery.is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let mut gallery = Gallery::new();
        let image = photo(3);
        gallery.append(image.clone());
        gallery.append(image);
        assert_eq!(gallery.len(), 2);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut gallery = Gallery::new();
        assert!(gallery.remove(0).is_none());
    }
}
