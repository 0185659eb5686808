use crate::dex::items::ClassDef;
use crate::dex::section::SectionKind;
use crate::dex::DexFile;
use crate::tests::fixtures::{app_v1, app_v2, compile};
use crate::{apply_patch, generate_patch, DexPatchConfig, ErrorKind};

fn class_names(dex: &DexFile) -> Vec<String> {
    dex.read_items::<ClassDef>()
        .unwrap()
        .iter()
        .map(|(_, c)| dex.type_descriptor(c.class_idx).unwrap())
        .collect()
}

#[test]
fn excluded_package_is_left_out() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    let config = DexPatchConfig::new().exclude("com.example.loader.*");

    let output = generate_patch(&old, &new, &config).unwrap();
    assert_eq!(output.excluded_classes, vec!["Lcom/example/loader/Loader;"]);
    assert_eq!(output.section_stats(SectionKind::ClassDefs).unwrap().deleted, 1);

    let patched = apply_patch(&old, &output.patch).unwrap();
    assert_eq!(patched.len() as u32, output.patched_size);
    let dex = DexFile::from_bytes(&patched).unwrap();
    let mut expected = class_names(&DexFile::from_bytes(&new).unwrap());
    expected.retain(|name| name != "Lcom/example/loader/Loader;");
    assert_eq!(expected.len(), 3);
    assert_eq!(class_names(&dex), expected);
    assert_eq!(dex.count(SectionKind::ClassData), 3);
}

#[test]
fn descriptor_patterns_match_too() {
    let old = compile(&app_v1());
    let config = DexPatchConfig::new().exclude("Lcom/example/*/Ex?ra;");
    let output = generate_patch(&old, &compile(&app_v2()), &config).unwrap();
    assert_eq!(output.excluded_classes, vec!["Lcom/example/app/Extra;"]);

    let patched = DexFile::from_bytes(&apply_patch(&old, &output.patch).unwrap()).unwrap();
    assert_eq!(class_names(&patched), class_names(&DexFile::from_bytes(&old).unwrap()));
}

#[test]
fn unmatched_patterns_change_nothing() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    let output = generate_patch(&old, &new, &DexPatchConfig::new().exclude("org.other.**")).unwrap();
    assert!(output.excluded_classes.is_empty());
    assert_eq!(apply_patch(&old, &output.patch).unwrap(), new);
}

#[test]
fn dangling_annotation_reference_warns_or_fails() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    // Main is annotated with Util
    let config = DexPatchConfig::new().exclude("com.example.app.Util");

    let output = generate_patch(&old, &new, &config).unwrap();
    assert_eq!(output.excluded_classes, vec!["Lcom/example/app/Util;"]);
    assert!(apply_patch(&old, &output.patch).is_ok());

    let e = generate_patch(&old, &new, &config.strict_exclusions(true)).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Exclusion);
    assert!(e.message().contains("Lcom/example/app/Main;"));
}

#[test]
fn malformed_pattern_is_rejected() {
    let old = compile(&app_v1());
    let e = generate_patch(&old, &old, &DexPatchConfig::new().exclude("")).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Malformed);
}
