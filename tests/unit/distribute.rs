use super::*;
use std::sync::Arc;

use crate::foundation::random::Rng64;
use crate::scene::builder::{CompositionBuilder, RegionBuilder};

#[path = "support.rs"]
#[allow(dead_code)]
mod support;

use support::{FakeBackend, video};

fn media() -> MetadataResolver {
    MetadataResolver::new(Arc::new(
        FakeBackend::default()
            .with("wide.mp4", video(1920, 1080, 10.0))
            .with("wide2.mp4", video(1280, 720, 10.0))
            .with("tall.mp4", video(1080, 1920, 10.0)),
    ))
}

fn layout(sizes: &[(u32, u32)]) -> (Composition, Vec<RegionId>) {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1920, 1920));
    let root = b.root();
    let ids = sizes
        .iter()
        .map(|&(w, h)| b.add(root, RegionBuilder::new(w, h)).unwrap())
        .collect();
    (b.build().unwrap(), ids)
}

fn names(comp: &Composition, id: RegionId) -> Vec<String> {
    comp.region(id)
        .unwrap()
        .excerpts
        .iter()
        .map(|e| e.source.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn excerpts_go_to_matching_aspect_ratio() {
    let (mut comp, ids) = layout(&[(1280, 720), (720, 1280)]);
    let placed = distribute_excerpts(
        &mut comp,
        &ids,
        &[Excerpt::new("tall.mp4"), Excerpt::new("wide.mp4")],
        &media(),
        &DistributeOpts::default(),
        &mut Rng64::new(0),
    )
    .unwrap();
    assert_eq!(placed, 2);
    assert_eq!(names(&comp, ids[0]), vec!["wide.mp4"]);
    assert_eq!(names(&comp, ids[1]), vec!["tall.mp4"]);
}

#[test]
fn equal_regions_are_balanced() {
    let (mut comp, ids) = layout(&[(1280, 720), (1280, 720)]);
    let list: Vec<Excerpt> = (0..4).map(|_| Excerpt::new("wide.mp4")).collect();
    distribute_excerpts(
        &mut comp,
        &ids,
        &list,
        &media(),
        &DistributeOpts::default(),
        &mut Rng64::new(0),
    )
    .unwrap();
    assert_eq!(names(&comp, ids[0]).len(), 2);
    assert_eq!(names(&comp, ids[1]).len(), 2);
}

#[test]
fn imbalance_overrides_aspect_ratio() {
    let (mut comp, ids) = layout(&[(1280, 720), (720, 1280)]);
    let list: Vec<Excerpt> = (0..3).map(|_| Excerpt::new("wide.mp4")).collect();
    distribute_excerpts(
        &mut comp,
        &ids,
        &list,
        &media(),
        &DistributeOpts::default(),
        &mut Rng64::new(0),
    )
    .unwrap();
    assert_eq!(names(&comp, ids[0]).len(), 2);
    assert_eq!(names(&comp, ids[1]).len(), 1);
}

#[test]
fn minimum_duration_repeats_the_list() {
    let (mut comp, ids) = layout(&[(1280, 720)]);
    let placed = distribute_excerpts(
        &mut comp,
        &ids,
        &[Excerpt::range("wide.mp4", 0.0, 10.0)],
        &media(),
        &DistributeOpts {
            min_duration: Some(25.0),
            shuffle: false,
        },
        &mut Rng64::new(0),
    )
    .unwrap();
    assert_eq!(placed, 3);
}

#[test]
fn zero_length_excerpts_do_not_loop_forever() {
    let (mut comp, ids) = layout(&[(1280, 720)]);
    let placed = distribute_excerpts(
        &mut comp,
        &ids,
        &[Excerpt::range("wide.mp4", 10.0, 10.0)],
        &media(),
        &DistributeOpts {
            min_duration: Some(5.0),
            shuffle: false,
        },
        &mut Rng64::new(0),
    )
    .unwrap();
    assert_eq!(placed, 1);
}

#[test]
fn shuffle_is_reproducible_from_the_seed() {
    let list = vec![
        Excerpt::new("wide.mp4"),
        Excerpt::new("wide2.mp4"),
        Excerpt::range("wide.mp4", 0.0, 5.0),
        Excerpt::range("wide2.mp4", 2.0, 6.0),
    ];
    let opts = DistributeOpts {
        min_duration: None,
        shuffle: true,
    };
    let run = |seed| {
        let (mut comp, ids) = layout(&[(1280, 720), (1280, 720)]);
        distribute_excerpts(&mut comp, &ids, &list, &media(), &opts, &mut Rng64::new(seed)).unwrap();
        comp
    };
    assert_eq!(run(42), run(42));
}

#[test]
fn requires_regions() {
    let (mut comp, _) = layout(&[]);
    let err = distribute_excerpts(
        &mut comp,
        &[],
        &[Excerpt::new("wide.mp4")],
        &media(),
        &DistributeOpts::default(),
        &mut Rng64::new(0),
    )
    .unwrap_err();
    assert!(matches!(err, VeditError::Validation(_)));
}
