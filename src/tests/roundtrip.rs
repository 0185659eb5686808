use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dex::builder::DexBuilder;
use crate::dex::code::{ClassDataItem, CodeItem};
use crate::dex::items::{ClassDef, MethodId, StringData};
use crate::dex::section::{SectionKind, PATCH_ORDER};
use crate::dex::DexFile;
use crate::patch::{DexPatchFile, DexPatchGenerator};
use crate::tests::fixtures::{app_v1, app_v2, compile, Class, Method};
use crate::{apply_patch, generate_patch, DexPatchConfig};

fn roundtrip(old: &[u8], new: &[u8]) -> Vec<u8> {
    let output = generate_patch(old, new, &DexPatchConfig::default()).unwrap();
    let patched = apply_patch(old, &output.patch).unwrap();
    assert_eq!(patched.len() as u32, output.patched_size);
    patched
}

fn class_data_of(dex: &DexFile, descriptor: &str) -> ClassDataItem {
    let (_, class_def) = dex
        .read_items::<ClassDef>()
        .unwrap()
        .into_iter()
        .find(|(_, c)| dex.type_descriptor(c.class_idx).unwrap() == descriptor)
        .unwrap();
    dex.read_item_at::<ClassDataItem>(class_def.class_data_off).unwrap()
}

fn method_name(dex: &DexFile, method_idx: u32) -> String {
    let methods = dex.read_items::<MethodId>().unwrap();
    dex.string(methods[method_idx as usize].1.name_idx).unwrap()
}

#[test]
fn strings_only_container() {
    let build = |values: &[&str]| {
        let mut b = DexBuilder::new();
        for v in values {
            b.add_string(v);
        }
        b.build().unwrap()
    };
    let old = build(&["a", "b", "c"]);
    let new = build(&["b", "c", "d"]);

    let output = generate_patch(&old, &new, &DexPatchConfig::default()).unwrap();
    let stats = output.section_stats(SectionKind::StringData).unwrap();
    assert_eq!((stats.added, stats.deleted, stats.kept), (1, 1, 2));

    let patched = apply_patch(&old, &output.patch).unwrap();
    assert_eq!(patched, new);
    let dex = DexFile::from_bytes(&patched).unwrap();
    let strings: Vec<String> =
        dex.read_items::<StringData>().unwrap().iter().map(|(_, s)| s.to_string().unwrap()).collect();
    assert_eq!(strings, vec!["b", "c", "d"]);
}

#[test]
fn app_upgrade_reproduces_new_container() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    assert_eq!(roundtrip(&old, &new), new);
}

#[test]
fn app_downgrade_reproduces_old_container() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    assert_eq!(roundtrip(&new, &old), old);
}

#[test]
fn every_patchable_section_is_exercised() {
    let old = DexFile::from_bytes(&compile(&app_v1())).unwrap();
    for kind in PATCH_ORDER {
        assert!(old.count(kind) > 0, "{} is empty in the fixture", kind);
    }
}

#[test]
fn identical_containers_give_an_empty_patch() {
    let old = compile(&app_v1());
    let output = generate_patch(&old, &old, &DexPatchConfig::default()).unwrap();
    assert!(output.is_identity());
    // header plus three zero counts per section
    assert_eq!(output.patch.len(), 96 + 3 * PATCH_ORDER.len());
    assert_eq!(apply_patch(&old, &output.patch).unwrap(), old);
}

#[test]
fn method_reindex_reaches_class_data_and_code() {
    let old_bytes = compile(&app_v1());
    let new_bytes = compile(&app_v2());
    let old = DexFile::from_bytes(&old_bytes).unwrap();
    let output = DexPatchGenerator::new(&old, &DexFile::from_bytes(&new_bytes).unwrap()).generate().unwrap();
    assert!(output.section_stats(SectionKind::MethodIds).unwrap().moved > 0);

    let patched = DexFile::from_bytes(&apply_patch(&old_bytes, &output.patch).unwrap()).unwrap();
    let before = class_data_of(&old, "Lcom/example/app/Util;");
    let after = class_data_of(&patched, "Lcom/example/app/Util;");
    let indices = |d: &ClassDataItem| d.direct_methods.iter().map(|m| m.method_idx).collect::<Vec<_>>();
    assert_eq!(indices(&before), vec![3, 4]);
    assert_eq!(indices(&after), vec![5, 6]);
    assert_eq!(method_name(&patched, 6), "helper");

    // Main.onCreate: const-string, invoke-static {} Util.helper, return-void
    let main = class_data_of(&patched, "Lcom/example/app/Main;");
    let on_create = main.virtual_methods.iter().find(|m| method_name(&patched, m.method_idx) == "onCreate").unwrap();
    let code = patched.read_item_at::<CodeItem>(on_create.code_off).unwrap();
    assert_eq!(code.insns[2], 0x0071);
    assert_eq!(code.insns[3], 6);
}

#[test]
fn patched_layout_is_ordered_and_aligned() {
    let old = compile(&app_v1());
    let new = compile(&app_v2());
    let output = generate_patch(&old, &new, &DexPatchConfig::default()).unwrap();
    let header = DexPatchFile::parse(&output.patch).unwrap().header().clone();

    let data: Vec<u32> = PATCH_ORDER
        .iter()
        .filter(|k| k.is_data())
        .map(|k| header.section_offset(*k))
        .filter(|off| *off != 0)
        .collect();
    assert!(data.windows(2).all(|w| w[0] < w[1]), "data sections out of order: {:x?}", data);

    let patched = DexFile::from_bytes(&apply_patch(&old, &output.patch).unwrap()).unwrap();
    for entry in patched.toc.entries() {
        if entry.kind.is_aligned() {
            assert_eq!(entry.offset % 4, 0, "{} at {:#x}", entry.kind, entry.offset);
        }
        if entry.kind.patch_ordinal().is_some() {
            assert_eq!(entry.offset, header.section_offset(entry.kind));
        }
    }
    assert!(patched.read_items::<CodeItem>().unwrap().iter().all(|(off, _)| off % 4 == 0));
    assert_eq!(patched.header.data_off, header.section_offset(SectionKind::StringData));
}

fn random_app(rng: &mut StdRng) -> Vec<Class> {
    const METHODS: [&str; 5] = ["<init>", "alpha", "beta", "delta", "gamma"];
    let mut classes = vec![];
    for i in 0..5usize {
        if !classes.is_empty() && rng.random_range(0..4) == 0 {
            continue;
        }
        let descriptor = format!("Lcom/example/rand/C{};", i);
        let mut class = Class::new(&descriptor);
        for (j, name) in ["a", "b", "c"].iter().enumerate() {
            if rng.random_range(0..2) == 0 {
                class = class.field(name, if j == 2 { "J" } else { "I" });
            }
        }
        if rng.random_range(0..2) == 0 {
            class = class.static_field("NAME", "Ljava/lang/String;", &format!("C{}-{}", i, rng.random_range(0..3)));
        }
        if rng.random_range(0..3) == 0 {
            class = class.annotated_with(&descriptor);
        }
        if rng.random_range(0..3) == 0 {
            class = class.implements("Ljava/lang/Runnable;");
        }

        let names: Vec<&str> = METHODS.iter().copied().filter(|_| rng.random_range(0..3) > 0).collect();
        for (j, name) in names.iter().enumerate() {
            let line = (i * 100 + j * 10) as u32 + rng.random_range(0..3);
            let mut method = Method::new(name, line).literal(&format!("C{}.{}#{}", i, name, rng.random_range(0..3)));
            if rng.random_range(0..2) == 0 {
                method = method.param("I");
            }
            if rng.random_range(0..4) == 0 {
                method = method.catches("Ljava/lang/Exception;");
            }
            if rng.random_range(0..4) == 0 {
                method = method.annotated();
            }
            if j > 0 && rng.random_range(0..2) == 0 {
                method = method.calls(&descriptor, names[j - 1]);
            }
            class = class.method(method);
        }
        classes.push(class);
    }
    classes
}

#[test]
fn random_versions_roundtrip() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..25 {
        let old = compile(&random_app(&mut rng));
        let new = compile(&random_app(&mut rng));
        assert_eq!(roundtrip(&old, &new), new);
    }
}
