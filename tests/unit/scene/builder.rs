use super::*;
use crate::scene::model::DisplayStyle;

#[test]
fn builder_numbers_regions_in_creation_order() {
    let mut b = CompositionBuilder::new(RegionBuilder::new(1920, 1080).duration(12.0));
    let left = b.add(b.root(), RegionBuilder::new(960, 1080)).unwrap();
    let right = b
        .add(b.root(), RegionBuilder::new(960, 1080).position(960, 0))
        .unwrap();
    let inner = b.add(right, RegionBuilder::new(100, 100).z_index(-1)).unwrap();
    let comp = b.output("out.mp4").build().unwrap();

    assert_eq!((left, right, inner), (RegionId(1), RegionId(2), RegionId(3)));
    assert_eq!(comp.region(inner).unwrap().parent, Some(right));
    assert_eq!(comp.region(right).unwrap().x, 960);
    assert_eq!(comp.output.path, PathBuf::from("out.mp4"));
    assert!(comp.output.normalize_audio);
}

#[test]
fn builder_rejects_unknown_parent() {
    let mut b = CompositionBuilder::new(RegionBuilder::default());
    assert!(b.add(RegionId(7), RegionBuilder::default()).is_err());
}

#[test]
fn builder_validates_on_build() {
    let b = CompositionBuilder::new(RegionBuilder::default().duration(-3.0));
    assert!(matches!(b.build(), Err(VeditError::Composition(_))));
}

#[test]
fn json_tree_flattens_pre_order() {
    let json = r#"{
        "root": {
            "width": 1280, "height": 720,
            "background": {"color": "Green"},
            "children": [
                {"width": 640, "height": 720,
                 "excerpts": [{"source": "a.mp4", "start": 1.0, "end": 4.0}],
                 "children": [{"width": 10, "height": 10}]},
                {"x": 640, "width": 640, "height": 720,
                 "display": {"style": "crop"}}
            ]
        },
        "output": {"path": "final.mp4", "sar": "1:1"}
    }"#;
    let comp = CompositionDef::from_json(json).unwrap();
    assert_eq!(comp.regions.len(), 4);
    assert_eq!(comp.regions[1].parent, Some(RegionId(0)));
    assert_eq!(comp.regions[2].parent, Some(RegionId(1)));
    assert_eq!(comp.regions[3].parent, Some(RegionId(0)));
    assert_eq!(comp.regions[3].x, 640);
    assert_eq!(
        comp.regions[3].display.as_ref().map(|d| d.style),
        Some(DisplayStyle::Crop)
    );
    assert_eq!(comp.regions[1].excerpts[0].end, Some(4.0));
    assert_eq!(comp.output.sar, Some(Sar::SQUARE));
    assert_eq!(comp.regions[0].background.color.as_str(), "Green");
}

#[test]
fn malformed_json_is_a_serde_error() {
    assert!(matches!(
        CompositionDef::from_json("{\"root\": 3}"),
        Err(VeditError::Serde(_))
    ));
}
