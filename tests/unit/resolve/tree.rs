use super::*;
use crate::foundation::core::Color;
use crate::foundation::random::Rng64;
use crate::scene::builder::{CompositionBuilder, RegionBuilder};

#[path = "../support.rs"]
#[allow(dead_code)]
mod support;

use support::{FakeBackend, audio_only, video, with_audio, with_sar};

fn backend() -> FakeBackend {
    FakeBackend::default()
        .with("a.mp4", video(1280, 720, 30.0))
        .with("wide.mp4", video(1920, 1080, 30.0))
        .with("tall.mp4", video(720, 1024, 30.0))
        .with("song.mp3", audio_only(200.0, 2))
        .with("short.mp3", audio_only(3.0, 2))
}

fn run(comp: &Composition, backend: FakeBackend) -> VeditResult<ResolvedPlan> {
    let media = MetadataResolver::new(Arc::new(backend));
    resolve(comp, &media, &mut Rng64::new(7))
}

#[test]
fn explicit_duration_outlasts_content() {
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .duration(8.0)
            .background_color(Color::new("Green").unwrap())
            .excerpt(Excerpt::range("a.mp4", 0.0, 5.0)),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert_eq!(plan.output.duration, 8.0);
    let root = plan.region(plan.root).unwrap();
    assert_eq!(root.excerpts.len(), 1);
    assert_eq!(root.excerpts[0].timeline_end(), 5.0);
    assert!(plan.advisories.is_empty());
}

#[test]
fn fitted_excerpts_play_back_to_back() {
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .excerpt(Excerpt::range("a.mp4", 0.0, 5.0))
            .excerpt(Excerpt::range("a.mp4", 2.0, 4.0)),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let root = plan.region(plan.root).unwrap();
    assert_eq!(root.duration, 7.0);
    assert_eq!(root.excerpts[0].timeline_start, 0.0);
    assert_eq!(root.excerpts[1].timeline_start, 5.0);
}

#[test]
fn resolution_is_deterministic() {
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .display(DisplayPolicy::cascade(crate::scene::model::CascadeDirection::Up))
            .excerpts((0..6).map(|i| Excerpt::range("a.mp4", f64::from(i), 10.0))),
    )
    .build()
    .unwrap();
    let a = run(&comp, backend()).unwrap();
    let b = run(&comp, backend()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn root_duration_comes_from_children() {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1280, 720));
    let with_clip = b
        .add(
            b.root(),
            RegionBuilder::new(640, 360).excerpt(Excerpt::range("a.mp4", 0.0, 5.0)),
        )
        .unwrap();
    let timed = b.add(b.root(), RegionBuilder::new(640, 360).duration(9.0)).unwrap();
    let empty = b.add(b.root(), RegionBuilder::new(10, 10)).unwrap();
    let comp = b.build().unwrap();

    let plan = run(&comp, backend()).unwrap();
    assert_eq!(plan.output.duration, 9.0);
    assert_eq!(plan.region(with_clip).unwrap().duration, 5.0);
    assert_eq!(plan.region(timed).unwrap().duration, 9.0);
    let empty = plan.region(empty).unwrap();
    assert_eq!(empty.duration, 0.0);
    assert!(empty.is_noop());
}

#[test]
fn root_without_any_duration_is_an_error() {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1280, 720));
    b.add(b.root(), RegionBuilder::new(10, 10)).unwrap();
    let comp = b.build().unwrap();
    assert!(matches!(run(&comp, backend()), Err(VeditError::Composition(_))));
}

#[test]
fn audio_track_sets_duration_and_fades_when_longer() {
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .audio_track("song.mp3")
            .audio_desc("Music: someone")
            .excerpt(Excerpt::range("a.mp4", 0.0, 5.0)),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let root = plan.region(plan.root).unwrap();
    assert_eq!(root.duration, 200.0);
    // track is exactly as long as the region
    assert_eq!(root.audio_track.as_ref().unwrap().fade_out, None);
    assert_eq!(root.caption.as_ref().unwrap().start, 195.0);
    assert_eq!(plan.output.audio_channels, Some(2));

    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .duration(20.0)
            .audio_track("song.mp3")
            .audio_desc("Music: someone"),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let root = plan.region(plan.root).unwrap();
    assert_eq!(root.audio_track.as_ref().unwrap().fade_out, Some((15.0, 5.0)));
    assert_eq!(root.caption.as_ref().unwrap().start, 15.0);

    let comp = CompositionBuilder::new(RegionBuilder::new(1280, 720).audio_track("short.mp3"))
        .build()
        .unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert_eq!(plan.output.duration, 3.0);
}

#[test]
fn children_stack_by_z_then_creation() {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1280, 720).duration(1.0));
    let first = b.add(b.root(), RegionBuilder::new(10, 10).duration(1.0)).unwrap();
    let sunk = b
        .add(b.root(), RegionBuilder::new(10, 10).duration(1.0).z_index(-5))
        .unwrap();
    let last = b.add(b.root(), RegionBuilder::new(10, 10).duration(1.0)).unwrap();
    let comp = b.build().unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert_eq!(
        plan.region(plan.root).unwrap().children,
        vec![sunk, first, last]
    );
    assert_eq!(plan.order, vec![sunk, first, last, plan.root]);
}

#[test]
fn mixed_sars_fall_back_to_square_with_advisory() {
    let b = backend().with("anamorphic.mp4", with_sar(video(720, 480, 30.0), 32, 27));
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .excerpt(Excerpt::range("anamorphic.mp4", 0.0, 2.0))
            .excerpt(Excerpt::range("a.mp4", 0.0, 2.0)),
    )
    .build()
    .unwrap();
    let plan = run(&comp, b).unwrap();
    assert_eq!(plan.output.sar, Sar::SQUARE);
    assert!(plan.has_advisory(AdvisoryKind::MixedSar));
}

#[test]
fn single_source_sar_is_kept_and_explicit_sar_wins() {
    let b = || backend().with("anamorphic.mp4", with_sar(video(720, 480, 30.0), 32, 27));
    let root = || RegionBuilder::new(1280, 720).excerpt(Excerpt::range("anamorphic.mp4", 0.0, 2.0));

    let plan = run(&CompositionBuilder::new(root()).build().unwrap(), b()).unwrap();
    assert_eq!(plan.output.sar, Sar { num: 32, den: 27 });
    assert!(plan.advisories.is_empty());

    let comp = CompositionBuilder::new(root()).sar(Sar::SQUARE).build().unwrap();
    let plan = run(&comp, b()).unwrap();
    assert_eq!(plan.output.sar, Sar::SQUARE);
    assert!(plan.has_advisory(AdvisoryKind::SarOverride));
}

#[test]
fn channel_counts_agree_or_downmix_to_mono() {
    let audio_policy = DisplayPolicy::default().with_audio(true);
    let make = |names: [&str; 3]| {
        CompositionBuilder::new(
            RegionBuilder::new(1280, 720)
                .display(audio_policy.clone())
                .excerpts(names.map(|n| Excerpt::range(n, 0.0, 2.0))),
        )
        .build()
        .unwrap()
    };
    let b = || {
        backend()
            .with("s1.mp4", with_audio(video(640, 360, 10.0), 2))
            .with("s2.mp4", with_audio(video(640, 360, 10.0), 2))
            .with("m.mp4", with_audio(video(640, 360, 10.0), 1))
            .with("x.mp4", with_audio(video(640, 360, 10.0), 6))
    };

    let plan = run(&make(["s1.mp4", "s2.mp4", "s1.mp4"]), b()).unwrap();
    assert_eq!(plan.output.audio_channels, Some(2));

    let plan = run(&make(["s1.mp4", "m.mp4", "x.mp4"]), b()).unwrap();
    assert_eq!(plan.output.audio_channels, Some(1));
    assert!(plan.has_advisory(AdvisoryKind::MixedChannels));

    let plan = run(&make(["s1.mp4", "m.mp4", "s2.mp4"]), b()).unwrap();
    let mixed: Vec<&str> = plan
        .advisories
        .iter()
        .filter(|a| a.kind == AdvisoryKind::MixedChannels)
        .map(|a| a.message.as_str())
        .collect();
    assert_eq!(mixed.len(), 1);
    assert!(mixed[0].contains("(1, 2)"), "{}", mixed[0]);

    let plan = run(&make(["a.mp4", "a.mp4", "a.mp4"]), b()).unwrap();
    assert_eq!(plan.output.audio_channels, None);
    assert!(plan.has_advisory(AdvisoryKind::MissingAudio));
}

#[test]
fn excerpt_ranges_are_checked_against_the_source() {
    let one = |ex: Excerpt| CompositionBuilder::new(RegionBuilder::new(1280, 720).excerpt(ex)).build().unwrap();

    let plan = run(
        &one(Excerpt {
            start: -3.0,
            ..Excerpt::new("a.mp4")
        }),
        backend(),
    )
    .unwrap();
    let ex = &plan.region(plan.root).unwrap().excerpts[0];
    assert_eq!((ex.start, ex.end), (0.0, 30.0));

    assert!(matches!(
        run(&one(Excerpt::range("a.mp4", 30.0, 31.0)), backend()),
        Err(VeditError::Composition(_))
    ));
    assert!(matches!(
        run(&one(Excerpt::range("a.mp4", 0.0, 31.0)), backend()),
        Err(VeditError::Composition(_))
    ));
    assert!(matches!(
        run(&one(Excerpt::new("missing.mp4")), backend()),
        Err(VeditError::Probe(_))
    ));
    assert!(matches!(
        run(&one(Excerpt::new("song.mp3")), backend()),
        Err(VeditError::Probe(_))
    ));
}

#[test]
fn alternating_pan_flips_only_on_overscanning_excerpts() {
    let comp = CompositionBuilder::new(
        RegionBuilder::new(720, 1024)
            .display(DisplayPolicy::pan(PanDirection::Alternate))
            .excerpt(Excerpt::range("wide.mp4", 0.0, 2.0))
            .excerpt(Excerpt::range("tall.mp4", 0.0, 2.0))
            .excerpt(Excerpt::range("wide.mp4", 0.0, 2.0))
            .excerpt(Excerpt::range("wide.mp4", 2.0, 4.0))
            .excerpt(
                Excerpt::range("wide.mp4", 4.0, 6.0)
                    .with_display(DisplayPolicy::pan(PanDirection::Alternate)),
            ),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let dirs: Vec<Option<PanDirection>> = plan
        .region(plan.root)
        .unwrap()
        .excerpts
        .iter()
        .map(|e| e.pan_direction)
        .collect();
    assert_eq!(
        dirs,
        vec![
            Some(PanDirection::Right),
            None,
            Some(PanDirection::Left),
            Some(PanDirection::Right),
            Some(PanDirection::Right),
        ]
    );
    let root = plan.region(plan.root).unwrap();
    assert!(root.excerpts[2].transform.pan.unwrap().reverse);
    assert!(!root.excerpts[3].transform.pan.unwrap().reverse);
}

#[test]
fn watermarks_anchor_and_clamp_fades() {
    let mark = Watermark::solid(Color::white(), 100, 50)
        .unwrap()
        .anchored(Anchor::BottomRight, 10)
        .fade_in(0.0, 2.0)
        .fade_out(-3.0, 5.0);
    let late = Watermark::solid(Color::white(), 10, 10)
        .unwrap()
        .at(5, 6)
        .fade_in(12.0, 1.0);
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .duration(10.0)
            .watermark(mark)
            .watermark(late),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let w = &plan.region(plan.root).unwrap().watermarks;
    assert_eq!((w[0].x, w[0].y), (1170, 660));
    assert_eq!(w[0].fade_in, Some((0.0, 2.0)));
    assert_eq!(w[0].fade_out, Some((7.0, 3.0)));
    assert_eq!((w[1].x, w[1].y), (5, 6));
    assert_eq!(w[1].fade_in, Some((10.0, 0.0)));
}

#[test]
fn cascade_tiles_are_scheduled_over_fitted_content() {
    let tile = DisplayPolicy::cascade(crate::scene::model::CascadeDirection::Down);
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .excerpt(Excerpt::range("a.mp4", 0.0, 5.0))
            .excerpts((0..5).map(|_| Excerpt::range("a.mp4", 0.0, 10.0).with_display(tile.clone()))),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    let root = plan.region(plan.root).unwrap();
    let starts: Vec<f64> = root.excerpts[1..].iter().map(|e| e.timeline_start).collect();
    assert_eq!(starts, vec![0.0, 4.0, 8.0, 12.0, 16.0]);
    assert_eq!(root.duration, 26.0);
    assert!(matches!(root.excerpts[0].placement, ExcerptPlacement::Fitted));
    assert!(matches!(root.excerpts[1].placement, ExcerptPlacement::Cascade(_)));
}

#[test]
fn cascade_parameter_disagreement_is_advised() {
    let a = DisplayPolicy::cascade(crate::scene::model::CascadeDirection::Down);
    let b = a.clone().with_cascade_limits(1, 0.0);
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .excerpt(Excerpt::range("a.mp4", 0.0, 3.0).with_display(a))
            .excerpt(Excerpt::range("a.mp4", 0.0, 3.0).with_display(b)),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert!(plan.has_advisory(AdvisoryKind::CascadeParams));
}

#[test]
fn absolute_rects_accumulate_and_overflow_is_advised() {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1280, 720).duration(1.0));
    let mid = b
        .add(b.root(), RegionBuilder::new(640, 360).position(100, 50).duration(1.0))
        .unwrap();
    let inner = b
        .add(mid, RegionBuilder::new(100, 100).position(10, 20).duration(1.0))
        .unwrap();
    let over = b
        .add(b.root(), RegionBuilder::new(640, 360).position(1000, 0).duration(1.0))
        .unwrap();
    let comp = b.build().unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert_eq!(plan.region(inner).unwrap().absolute, PixelRect::new(110, 70, 100, 100));
    let advised: Vec<Option<RegionId>> = plan
        .advisories
        .iter()
        .filter(|a| a.kind == AdvisoryKind::OutsideParent)
        .map(|a| a.region)
        .collect();
    assert_eq!(advised, vec![Some(over)]);
}

#[test]
fn background_image_size_mismatch_is_advised() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bg.png");
    image::RgbImage::new(10, 10).save(&path).unwrap();
    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .duration(1.0)
            .background_image(&path),
    )
    .build()
    .unwrap();
    let plan = run(&comp, backend()).unwrap();
    assert!(plan.has_advisory(AdvisoryKind::BackgroundSize));

    let comp = CompositionBuilder::new(
        RegionBuilder::new(1280, 720)
            .duration(1.0)
            .background_image(dir.path().join("nope.png")),
    )
    .build()
    .unwrap();
    assert!(matches!(run(&comp, backend()), Err(VeditError::Probe(_))));
}
