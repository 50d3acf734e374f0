//! Ordering, filtering and pagination for the public gallery and slideshow.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Image, ModerationStatus};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GallerySort {
    #[default]
    Latest,
    Oldest,
    MostLiked,
    MostCommented,
}

impl GallerySort {
    /// Unknown or missing values fall back to `Latest`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("oldest") => GallerySort::Oldest,
            Some("most_liked") => GallerySort::MostLiked,
            Some("most_commented") => GallerySort::MostCommented,
            _ => GallerySort::Latest,
        }
    }
}

fn approval_time(image: &Image) -> DateTime<Utc> {
    image.approved_at.unwrap_or(image.uploaded_at)
}

/// Stable sort; ties keep input order.
pub fn sort_images(images: &mut [Image], sort: GallerySort) {
    match sort {
        GallerySort::Latest => images.sort_by(|a, b| approval_time(b).cmp(&approval_time(a))),
        GallerySort::Oldest => images.sort_by_key(approval_time),
        GallerySort::MostLiked => images.sort_by(|a, b| b.like_count.cmp(&a.like_count)),
        GallerySort::MostCommented => {
            images.sort_by(|a, b| b.comment_count.cmp(&a.comment_count))
        }
    }
}

/// Approved images, expiry ignored.
pub fn gallery_view(images: Vec<Image>) -> Vec<Image> {
    images
        .into_iter()
        .filter(|image| image.status == ModerationStatus::Approved)
        .collect()
}

/// Approved images that have not yet expired.
pub fn display_view(images: Vec<Image>, now: DateTime<Utc>) -> Vec<Image> {
    images
        .into_iter()
        .filter(|image| image.status == ModerationStatus::Approved && !image.is_expired(now))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

pub fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len();
    let items: Vec<T> = items
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();
    let has_more = page.offset.saturating_add(items.len()) < total;
    Page {
        items,
        total,
        offset: page.offset,
        limit: page.limit,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{fixture_image, fixture_tenant};
    use chrono::Duration;

    fn approved(minutes_ago: i64, likes: i32, comments: i32) -> Image {
        let tenant = fixture_tenant("gallery");
        let mut image = fixture_image(&tenant, ModerationStatus::Approved);
        image.approved_at = Some(Utc::now() - Duration::minutes(minutes_ago));
        image.like_count = likes;
        image.comment_count = comments;
        image
    }

    #[test]
    fn parse_falls_back_to_latest() {
        assert_eq!(GallerySort::parse(None), GallerySort::Latest);
        assert_eq!(GallerySort::parse(Some("bogus")), GallerySort::Latest);
        assert_eq!(GallerySort::parse(Some("oldest")), GallerySort::Oldest);
        assert_eq!(GallerySort::parse(Some("most_liked")), GallerySort::MostLiked);
        assert_eq!(
            GallerySort::parse(Some("most_commented")),
            GallerySort::MostCommented
        );
    }

    #[test]
    fn latest_reversed_equals_oldest_for_distinct_times() {
        let images = vec![approved(5, 0, 0), approved(1, 0, 0), approved(9, 0, 0)];
        let mut latest = images.clone();
        sort_images(&mut latest, GallerySort::Latest);
        let mut oldest = images;
        sort_images(&mut oldest, GallerySort::Oldest);
        latest.reverse();
        assert_eq!(latest, oldest);
    }

    #[test]
    fn counter_sorts_are_descending() {
        let mut images = vec![approved(1, 2, 9), approved(2, 7, 1), approved(3, 4, 4)];
        sort_images(&mut images, GallerySort::MostLiked);
        assert!(images.windows(2).all(|w| w[0].like_count >= w[1].like_count));
        sort_images(&mut images, GallerySort::MostCommented);
        assert!(images
            .windows(2)
            .all(|w| w[0].comment_count >= w[1].comment_count));
    }

    #[test]
    fn display_hides_expired_but_gallery_keeps_them() {
        let now = Utc::now();
        let tenant = fixture_tenant("views");
        let mut expired = approved(90, 0, 0);
        expired.expires_at = Some(now - Duration::minutes(30));
        let mut live = approved(10, 0, 0);
        live.expires_at = Some(now + Duration::minutes(50));
        let pending = fixture_image(&tenant, ModerationStatus::Pending);

        let all = vec![expired.clone(), live.clone(), pending];
        assert_eq!(display_view(all.clone(), now), vec![live.clone()]);
        assert_eq!(gallery_view(all), vec![expired, live]);
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PageRequest::new(None, None).limit, 50);
        assert_eq!(PageRequest::new(None, Some(0)).limit, 1);
        assert_eq!(PageRequest::new(None, Some(1000)).limit, 100);
    }

    #[test]
    fn paginate_slices_after_offset() {
        let page = paginate((0..10).collect(), PageRequest::new(Some(4), Some(3)));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 10);
        assert!(page.has_more);

        let tail = paginate((0..10).collect::<Vec<_>>(), PageRequest::new(Some(8), Some(5)));
        assert_eq!(tail.items, vec![8, 9]);
        assert!(!tail.has_more);

        let beyond = paginate((0..3).collect::<Vec<_>>(), PageRequest::new(Some(10), None));
        assert!(beyond.items.is_empty());
    }
}
