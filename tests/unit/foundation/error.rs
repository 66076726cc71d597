use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        GenError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        GenError::capacity("x")
            .to_string()
            .contains("capacity error:")
    );
    assert!(GenError::codec("x").to_string().contains("codec error:"));
    assert!(
        GenError::pipeline("x")
            .to_string()
            .contains("pipeline error:")
    );
}

#[test]
fn other_preserves_context_and_source() {
    use anyhow::Context as _;

    let res: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
    let err: GenError = res.context("write 'out/json/3.json'").unwrap_err().into();
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert!(chain.contains("out/json/3.json"));
    assert!(chain.contains("disk full"));
}
