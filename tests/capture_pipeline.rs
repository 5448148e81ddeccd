//! End-to-end capture pipeline tests against a scripted capture source

mod common;

use common::ScriptedSource;
use image::imageops;
use scrollstitch::planning::physical_edge;
use scrollstitch::{
    capture_page, CancelFlag, CaptureConfig, DirStore, Error, MemoryStore, PageGeometry,
    RasterLimits, SegmentRaster, SegmentStore,
};

fn geometry(dpr: f64) -> PageGeometry {
    PageGeometry {
        total_height: 2500,
        viewport_width: 200,
        viewport_height: 1000,
        device_pixel_ratio: dpr,
    }
}

/// Two viewports per segment for the 1000px viewport
fn config(id: &str, max_dimension: u32) -> CaptureConfig {
    CaptureConfig {
        capture_id: id.to_string(),
        limits: RasterLimits {
            max_dimension,
            ..Default::default()
        },
        scroll_settle_ms: 0,
        min_capture_interval_ms: 0,
    }
}

#[tokio::test]
async fn segments_reproduce_the_page() {
    let source = ScriptedSource::new(geometry(1.0));
    let page = source.page().clone();
    let log = source.log.clone();
    let store = MemoryStore::new();

    let outcome = capture_page(source, &store, &config("doc", 2000), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(outcome.strategy.viewports_per_segment, 2);
    assert_eq!(log.scrolls(), vec![0, 1000, 1500]);
    assert!(log.restored());

    let segments = store.load_all("doc").unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!((segments[0].meta.y_start, segments[0].meta.y_end), (0, 2000));
    assert_eq!((segments[1].meta.y_start, segments[1].meta.y_end), (2000, 2500));

    let expected0 = imageops::crop_imm(&page, 0, 0, 200, 2000).to_image();
    let expected1 = imageops::crop_imm(&page, 0, 2000, 200, 500).to_image();
    assert!(segments[0].image == expected0, "segment 0 differs from the page");
    assert!(segments[1].image == expected1, "segment 1 differs from the page");
}

#[tokio::test]
async fn fractional_dpr_segments_reproduce_the_page() {
    // 1001 CSS rows at DPR 1.25 do not land on whole physical rows
    let geometry = PageGeometry {
        total_height: 2002,
        viewport_width: 100,
        viewport_height: 1001,
        device_pixel_ratio: 1.25,
    };
    for max_dimension in [32_767, 1_300] {
        let source = ScriptedSource::new(geometry);
        let page = source.page().clone();
        let store = MemoryStore::new();

        let cfg = config("frac", max_dimension);
        let outcome = capture_page(source, &store, &cfg, CancelFlag::new()).await.unwrap();
        assert_eq!(outcome.strategy.effective_dpr, 1.25);

        let mut next_row = 0;
        for segment in store.load_all("frac").unwrap() {
            let (w, h) = segment.image.dimensions();
            let top = physical_edge(segment.meta.y_start as f64, 1.25) as u32;
            assert_eq!(top, next_row);
            let expected = imageops::crop_imm(&page, 0, top, w, h).to_image();
            assert_eq!(segment.image.get_pixel(0, h - 1)[3], 255, "bottom row left transparent");
            let index = segment.meta.index;
            assert!(segment.image == expected, "segment {} differs from the page", index);
            next_row = top + h;
        }
        assert_eq!(next_row, page.height());
    }
}

#[tokio::test]
async fn reduced_dpr_segments_stay_within_limits() {
    let source = ScriptedSource::new(geometry(2.0));
    let store = MemoryStore::new();
    let cfg = config("hidpi", 1000);

    let outcome = capture_page(source, &store, &cfg, CancelFlag::new()).await.unwrap();

    assert_eq!(outcome.strategy.effective_dpr, 1.0);
    let heights: Vec<u32> = outcome.segments.iter().map(|m| m.height).collect();
    assert_eq!(heights, vec![1000, 1000, 500]);
    for meta in &outcome.segments {
        assert_eq!(meta.width, 200);
        assert!(meta.height <= cfg.limits.max_dimension);
    }
    assert_eq!(outcome.segments.last().unwrap().y_start, 2000);
}

#[tokio::test]
async fn failure_discards_committed_segments() {
    let mut source = ScriptedSource::new(geometry(1.0));
    // the third capture belongs to the second segment
    source.fail_on_capture = Some(3);
    let log = source.log.clone();
    let store = MemoryStore::new();

    let err = capture_page(source, &store, &config("doc", 2000), CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Capture(_)));
    assert!(store.list("doc").unwrap().is_empty());
    assert!(log.restored());
}

#[tokio::test]
async fn cancellation_discards_committed_segments() {
    let cancel = CancelFlag::new();
    let mut source = ScriptedSource::new(geometry(1.0));
    source.cancel_on_capture = Some((3, cancel.clone()));
    let log = source.log.clone();
    let store = MemoryStore::new();

    let err = capture_page(source, &store, &config("doc", 2000), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(log.captures(), 3);
    assert!(store.list("doc").unwrap().is_empty());
}

#[tokio::test]
async fn stale_segments_are_replaced() {
    let store = MemoryStore::new();
    store
        .put(&SegmentRaster::new("doc", 7, 0, 10, image::RgbaImage::new(1, 1)))
        .unwrap();

    let source = ScriptedSource::new(geometry(1.0));
    let outcome = capture_page(source, &store, &config("doc", 2000), CancelFlag::new())
        .await
        .unwrap();

    let indices: Vec<usize> = store.list("doc").unwrap().iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(outcome.segments.len(), 2);
}

#[tokio::test]
async fn failed_capture_leaves_no_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirStore::open(dir.path()).unwrap();
    let mut source = ScriptedSource::new(geometry(1.0));
    source.fail_on_capture = Some(3);

    assert!(capture_page(source, &store, &config("doc", 2000), CancelFlag::new())
        .await
        .is_err());
    assert!(store.list("doc").unwrap().is_empty());
    assert!(!dir.path().join("doc").exists());
}

#[tokio::test]
async fn capture_interval_is_honoured() {
    let source = ScriptedSource::new(geometry(1.0));
    let store = MemoryStore::new();
    let cfg = CaptureConfig {
        min_capture_interval_ms: 30,
        ..config("paced", 2000)
    };

    let start = std::time::Instant::now();
    capture_page(source, &store, &cfg, CancelFlag::new()).await.unwrap();
    // three captures, two enforced gaps
    assert!(start.elapsed() >= std::time::Duration::from_millis(60));
}
