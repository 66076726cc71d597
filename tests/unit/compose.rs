use std::{collections::HashSet, io::Cursor, path::Path};

use rand::{SeedableRng as _, rngs::StdRng};

use super::*;
use crate::assets::{catalog::fingerprint, codec::PixelBuffer, codec::PngCodec};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "join_layers_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_layer(root: &Path, layer: &str, variants: u8) {
    let dir = root.join(layer);
    std::fs::create_dir_all(&dir).unwrap();
    for v in 0..variants {
        let img = image::RgbaImage::from_raw(1, 1, vec![v, layer.len() as u8, 7, 255]).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.join(format!("{layer}{v}#1.png")), buf).unwrap();
    }
}

fn asset(name: &str) -> Arc<Asset> {
    Arc::new(Asset {
        name: name.to_string(),
        layer: "L".to_string(),
        path: format!("L/{name}#1.png").into(),
        rarity: 1.0,
        fingerprint: fingerprint(name.as_bytes()),
        pixels: Arc::new(PixelBuffer::transparent(1, 1)),
    })
}

fn config(yaml: &str) -> Config {
    Config::from_yaml(yaml).unwrap()
}

fn composer<'a>(cfg: &'a Config, root: &Path) -> ItemComposer<'a> {
    ItemComposer::new(cfg, root, AssetCatalog::new(Arc::new(PngCodec)))
}

#[test]
fn columns_join_the_same_slot_across_layers() {
    let pools = vec![
        vec![asset("bg0"), asset("bg1"), asset("bg2")],
        vec![asset("eye0"), asset("eye1"), asset("eye2")],
    ];
    let items = columns("Apes", &pools);
    assert_eq!(items.len(), 3);
    for (k, item) in items.iter().enumerate() {
        assert_eq!(&*item.name_prefix, "Apes");
        assert_eq!(item.layers[0].name, format!("bg{k}"));
        assert_eq!(item.layers[1].name, format!("eye{k}"));
    }
}

#[test]
fn assign_ids_is_contiguous_from_offset() {
    let mut rng = StdRng::seed_from_u64(1);
    let pools = vec![(0..30).map(|i| asset(&format!("a{i}"))).collect::<Vec<_>>()];
    let mut items = columns("x", &pools);
    assign_ids(&mut items, 500, &mut rng).unwrap();

    let mut ids = items.iter().map(|i| i.id).collect::<Vec<_>>();
    assert_eq!(ids[0], 500);
    assert_eq!(*ids.last().unwrap(), 529);
    ids.sort_unstable();
    assert_eq!(ids, (500..530).collect::<Vec<_>>());
}

#[test]
fn assign_ids_rejects_overflowing_start() {
    let mut rng = StdRng::seed_from_u64(1);
    let pools = vec![vec![asset("a"), asset("b")]];
    let mut items = columns("x", &pools);
    assert!(assign_ids(&mut items, u64::MAX, &mut rng).is_err());

    let mut one = columns("x", &[vec![asset("a")]]);
    assign_ids(&mut one, u64::MAX, &mut rng).unwrap();
    assert_eq!(one[0].id, u64::MAX);
}

#[test]
fn trait_set_sizes_overflowing_u64_are_rejected() {
    let err = Config::from_yaml(
        r#"
name: Huge
base_uri: https://x/
width: 1
height: 1
trait_sets:
  - size: 18446744073709551615
    traits:
      - name: A
  - size: 1
    traits:
      - name: A
"#,
    )
    .unwrap_err();
    assert!(matches!(err, GenError::Config(_)), "{err}");
    assert!(err.to_string().contains("trait set #1"), "{err}");
}

#[test]
fn unallocatable_size_is_config_error() {
    let root = temp_dir("compose_huge");
    write_layer(&root, "A", 2);

    let cfg = config(
        r#"
name: Huge
base_uri: https://x/
width: 1
height: 1
trait_sets:
  - size: 18446744073709551615
    traits:
      - name: A
"#,
    );

    let mut rng = StdRng::seed_from_u64(3);
    let err = composer(&cfg, &root).compose(&mut rng).unwrap_err();
    assert!(matches!(err, GenError::Config(_)), "{err}");
    assert!(err.to_string().contains("too large"), "{err}");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn compose_multiple_trait_sets_share_one_id_range() {
    let root = temp_dir("compose_sets");
    write_layer(&root, "Background", 4);
    write_layer(&root, "Eyes", 3);
    write_layer(&root, "Hat", 5);

    let cfg = config(
        r#"
name: Apes
base_uri: https://x/
start_id: 10
check_duplication: true
width: 1
height: 1
trait_sets:
  - size: 6
    traits:
      - name: Background
      - name: Eyes
        display_name: Eye color
  - name: Hatted
    size: 8
    traits:
      - name: Background
      - name: Hat
"#,
    );

    let mut rng = StdRng::seed_from_u64(42);
    let mut comp = composer(&cfg, &root);
    let items = comp.compose(&mut rng).unwrap();
    assert_eq!(items.len(), 14);

    let mut ids = items.iter().map(|i| i.id).collect::<Vec<_>>();
    ids.sort_unstable();
    assert_eq!(ids, (10..24).collect::<Vec<_>>());

    let plain = items
        .iter()
        .filter(|i| &*i.name_prefix == "Apes")
        .collect::<Vec<_>>();
    let hatted = items
        .iter()
        .filter(|i| &*i.name_prefix == "Hatted")
        .collect::<Vec<_>>();
    assert_eq!(plain.len(), 6);
    assert_eq!(hatted.len(), 8);

    for item in &plain {
        let layers = item.layers.iter().map(|a| a.layer.as_str()).collect::<Vec<_>>();
        assert_eq!(layers, ["Background", "Eye color"]);
    }
    for item in &hatted {
        let layers = item.layers.iter().map(|a| a.layer.as_str()).collect::<Vec<_>>();
        assert_eq!(layers, ["Background", "Hat"]);
    }

    let plain_dna = plain.iter().map(|i| i.dna()).collect::<HashSet<_>>();
    let hatted_dna = hatted.iter().map(|i| i.dna()).collect::<HashSet<_>>();
    assert_eq!(plain_dna.len(), 6);
    assert_eq!(hatted_dna.len(), 8);

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn infeasible_trait_set_reports_capacity_error() {
    let root = temp_dir("compose_capacity");
    write_layer(&root, "A", 2);
    write_layer(&root, "B", 2);

    let cfg = config(
        r#"
name: Tiny
base_uri: https://x/
check_duplication: true
width: 1
height: 1
trait_sets:
  - size: 10
    traits:
      - name: A
      - name: B
"#,
    );

    let mut rng = StdRng::seed_from_u64(3);
    let err = composer(&cfg, &root).compose(&mut rng).unwrap_err();
    assert!(matches!(err, GenError::Capacity(_)), "{err}");
    assert!(err.to_string().contains("trait set #0"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn duplicates_allowed_when_dedup_is_off() {
    let root = temp_dir("compose_nodedup");
    write_layer(&root, "A", 2);

    let cfg = config(
        r#"
name: Tiny
base_uri: https://x/
width: 1
height: 1
trait_sets:
  - size: 10
    traits:
      - name: A
"#,
    );

    let mut rng = StdRng::seed_from_u64(3);
    let items = composer(&cfg, &root).compose(&mut rng).unwrap();
    assert_eq!(items.len(), 10);

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn empty_layer_folder_is_config_error() {
    let root = temp_dir("compose_empty");
    std::fs::create_dir_all(root.join("Nothing")).unwrap();

    let cfg = config(
        r#"
name: Tiny
base_uri: https://x/
width: 1
height: 1
trait_sets:
  - size: 1
    traits:
      - name: Nothing
"#,
    );

    let mut rng = StdRng::seed_from_u64(3);
    let err = composer(&cfg, &root).compose(&mut rng).unwrap_err();
    assert!(matches!(err, GenError::Config(_)), "{err}");
    assert!(err.to_string().contains("Nothing"));

    std::fs::remove_dir_all(&root).ok();
}
