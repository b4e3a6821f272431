use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(VeditError::probe("x").to_string().contains("probe error:"));
    assert!(
        VeditError::composition("x")
            .to_string()
            .contains("composition error:")
    );
    assert!(VeditError::cache("x").to_string().contains("cache error:"));
    assert!(VeditError::render("x").to_string().contains("render error:"));
    assert!(
        VeditError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        VeditError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = VeditError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
