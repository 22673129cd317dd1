//! Canonical storage path helpers.
//!
//! Every blob the service writes lives under one of five path families, all
//! relative with forward slashes. Both storage backends resolve the same
//! logical strings, so these helpers are the single source of truth for the
//! on-disk/on-bucket layout.

use uuid::Uuid;

/// Source blob: `uploads/raw/{video_id}{ext}`. `ext` carries its leading dot.
pub fn upload_path(video_id: Uuid, ext: &str) -> String {
    format!("uploads/raw/{}{}", video_id, ext)
}

/// Root prefix of all HLS artifacts for a video: `hls/{video_id}`.
pub fn hls_prefix(video_id: Uuid) -> String {
    format!("hls/{}", video_id)
}

/// Per-rendition prefix: `hls/{video_id}/{resolution}`.
pub fn variant_prefix(video_id: Uuid, resolution: &str) -> String {
    format!("hls/{}/{}", video_id, resolution)
}

/// Variant playlist: `hls/{video_id}/{resolution}/playlist.m3u8`.
pub fn variant_playlist_path(video_id: Uuid, resolution: &str) -> String {
    format!("hls/{}/{}/playlist.m3u8", video_id, resolution)
}

/// Zero-padded segment file name: `segment_NNN.ts`.
pub fn segment_name(index: u32) -> String {
    format!("segment_{:03}.ts", index)
}

/// Segment blob: `hls/{video_id}/{resolution}/{segment}`.
pub fn segment_path(video_id: Uuid, resolution: &str, segment: &str) -> String {
    format!("hls/{}/{}/{}", video_id, resolution, segment)
}

/// Master playlist: `hls/{video_id}/master.m3u8`.
pub fn master_playlist_path(video_id: Uuid) -> String {
    format!("hls/{}/master.m3u8", video_id)
}

/// Thumbnail prefix: `thumbnails/{video_id}`.
pub fn thumbnail_prefix(video_id: Uuid) -> String {
    format!("thumbnails/{}", video_id)
}

/// Thumbnail blob: `thumbnails/{video_id}/thumbnail.jpg`.
pub fn thumbnail_path(video_id: Uuid) -> String {
    format!("thumbnails/{}/thumbnail.jpg", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_pure_and_posix() {
        let id: Uuid = "f47ac10b-58cc-4372-a567-0e02b2c3d479".parse().unwrap();

        assert_eq!(
            upload_path(id, ".mp4"),
            "uploads/raw/f47ac10b-58cc-4372-a567-0e02b2c3d479.mp4"
        );
        assert_eq!(
            variant_playlist_path(id, "720p"),
            "hls/f47ac10b-58cc-4372-a567-0e02b2c3d479/720p/playlist.m3u8"
        );
        assert_eq!(
            segment_path(id, "720p", "segment_004.ts"),
            "hls/f47ac10b-58cc-4372-a567-0e02b2c3d479/720p/segment_004.ts"
        );
        assert_eq!(
            master_playlist_path(id),
            "hls/f47ac10b-58cc-4372-a567-0e02b2c3d479/master.m3u8"
        );
        assert_eq!(
            thumbnail_path(id),
            "thumbnails/f47ac10b-58cc-4372-a567-0e02b2c3d479/thumbnail.jpg"
        );
    }

    #[test]
    fn segment_names_are_zero_padded() {
        assert_eq!(segment_name(0), "segment_000.ts");
        assert_eq!(segment_name(7), "segment_007.ts");
        assert_eq!(segment_name(42), "segment_042.ts");
        assert_eq!(segment_name(123), "segment_123.ts");
    }

    #[test]
    fn prefixes_nest_under_path_families() {
        let id = Uuid::new_v4();
        assert!(variant_playlist_path(id, "480p").starts_with(&variant_prefix(id, "480p")));
        assert!(variant_prefix(id, "480p").starts_with(&hls_prefix(id)));
        assert!(thumbnail_path(id).starts_with(&thumbnail_prefix(id)));
    }
}
