//! A small class model compiled into canonical containers: id tables sorted the way the
//! dex format wants them and data items emitted class by class, so an item that survives
//! between two versions keeps its place relative to the other survivors.

use std::collections::{BTreeMap, BTreeSet};

use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::builder::DexBuilder;
use crate::dex::code::{CatchHandler, ClassDataItem, CodeItem, DebugInfoItem, DebugOp, EncodedField, EncodedMethod, TryItem};
use crate::dex::encoded_values::{VALUE_STRING, VALUE_TYPE};
use crate::dex::items::{ClassDef, EncodedArrayItem, FieldId, MethodId, ProtoId, TypeList};
use crate::dex::write_uleb128;

pub(crate) const OBJECT: &str = "Ljava/lang/Object;";
pub(crate) const MARKER: &str = "Lcom/example/Marker;";

const ACC_PUBLIC: u32 = 0x1;
const ACC_STATIC: u32 = 0x8;
const ACC_CONSTRUCTOR: u32 = 0x1_0000;
const VISIBILITY_RUNTIME: u8 = 1;

#[derive(Debug, Clone)]
pub(crate) struct Method {
    pub name: String,
    pub ret: String,
    pub params: Vec<String>,
    pub is_static: bool,
    pub line: u32,
    pub literal: String,
    /// (class descriptor, method name) of a method defined in the same model.
    pub calls: Option<(String, String)>,
    pub catches: Option<String>,
    pub annotated: bool,
}

impl Method {
    pub fn new(name: &str, line: u32) -> Method {
        Method {
            name: name.to_string(),
            ret: "V".to_string(),
            params: vec![],
            is_static: false,
            line,
            literal: format!("{}@{}", name, line),
            calls: None,
            catches: None,
            annotated: false,
        }
    }

    pub fn returns(mut self, ret: &str) -> Method {
        self.ret = ret.to_string();
        self
    }

    pub fn param(mut self, ty: &str) -> Method {
        self.params.push(ty.to_string());
        self
    }

    pub fn statik(mut self) -> Method {
        self.is_static = true;
        self
    }

    pub fn literal(mut self, s: &str) -> Method {
        self.literal = s.to_string();
        self
    }

    pub fn calls(mut self, class: &str, method: &str) -> Method {
        self.calls = Some((class.to_string(), method.to_string()));
        self
    }

    pub fn catches(mut self, ty: &str) -> Method {
        self.catches = Some(ty.to_string());
        self
    }

    pub fn annotated(mut self) -> Method {
        self.annotated = true;
        self
    }

    fn is_direct(&self) -> bool {
        self.is_static || self.name.starts_with('<')
    }

    fn shorty(&self) -> String {
        std::iter::once(&self.ret).chain(&self.params).map(|t| shorty_char(t)).collect()
    }
}

fn shorty_char(descriptor: &str) -> char {
    match descriptor.chars().next() {
        Some('L') | Some('[') | None => 'L',
        Some(c) => c,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub name: String,
    pub ty: String,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Class {
    pub descriptor: String,
    pub source: String,
    pub interfaces: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Type named by the class level `@Marker(value = ...)` annotation.
    pub annotation: Option<String>,
    /// Initial value of the static fields.
    pub static_value: Option<String>,
}

impl Class {
    pub fn new(descriptor: &str) -> Class {
        let simple = descriptor.trim_end_matches(';').rsplit('/').next().unwrap_or(descriptor);
        Class {
            descriptor: descriptor.to_string(),
            source: format!("{}.java", simple),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            annotation: None,
            static_value: None,
        }
    }

    pub fn implements(mut self, ty: &str) -> Class {
        self.interfaces.push(ty.to_string());
        self
    }

    pub fn field(mut self, name: &str, ty: &str) -> Class {
        self.fields.push(Field { name: name.to_string(), ty: ty.to_string(), is_static: false });
        self
    }

    pub fn static_field(mut self, name: &str, ty: &str, value: &str) -> Class {
        self.fields.push(Field { name: name.to_string(), ty: ty.to_string(), is_static: true });
        self.static_value = Some(value.to_string());
        self
    }

    pub fn method(mut self, method: Method) -> Class {
        self.methods.push(method);
        self
    }

    pub fn annotated_with(mut self, ty: &str) -> Class {
        self.annotation = Some(ty.to_string());
        self
    }
}


/// Hands out one handle per distinct item, in first-seen order.
struct Interner<T> {
    handles: BTreeMap<T, u32>,
}

impl<T: Ord + Clone> Interner<T> {
    fn new() -> Self {
        Interner { handles: BTreeMap::new() }
    }

    fn get_or(&mut self, item: T, add: impl FnOnce(T) -> u32) -> u32 {
        if let Some(h) = self.handles.get(&item) {
            return *h;
        }
        let h = add(item.clone());
        self.handles.insert(item, h);
        h
    }
}

fn encoded_index(out: &mut Vec<u8>, value_type: u8, idx: u32) {
    let bytes = idx.to_le_bytes();
    let mut n = 4;
    while n > 1 && bytes[n - 1] == 0 {
        n -= 1;
    }
    out.push(((n as u8 - 1) << 5) | value_type);
    out.extend_from_slice(&bytes[..n]);
}

fn marker_annotation(marker_type: u32, name: u32, value_type: u32) -> AnnotationItem {
    let mut encoded = vec![];
    write_uleb128(&mut encoded, marker_type);
    write_uleb128(&mut encoded, 1);
    write_uleb128(&mut encoded, name);
    encoded_index(&mut encoded, VALUE_TYPE, value_type);
    AnnotationItem { encoded_annotation: encoded, visibility: VISIBILITY_RUNTIME }
}

fn static_values(count: usize, string: u32) -> EncodedArrayItem {
    let mut bytes = vec![];
    write_uleb128(&mut bytes, count as u32);
    for _ in 0..count {
        encoded_index(&mut bytes, VALUE_STRING, string);
    }
    EncodedArrayItem { bytes }
}


/// Lay out `classes` as a canonical container.
pub(crate) fn compile(classes: &[Class]) -> Vec<u8> {
    let mut classes = classes.to_vec();
    classes.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));

    let mut types: BTreeSet<String> = [OBJECT, "I"].iter().map(|s| s.to_string()).collect();
    let mut strings: BTreeSet<String> = ["value", "local", "arg"].iter().map(|s| s.to_string()).collect();
    for c in &classes {
        types.insert(c.descriptor.clone());
        types.extend(c.interfaces.iter().cloned());
        strings.insert(c.source.clone());
        if let Some(ty) = &c.annotation {
            types.insert(MARKER.to_string());
            types.insert(ty.clone());
        }
        if let Some(v) = &c.static_value {
            strings.insert(v.clone());
        }
        for f in &c.fields {
            types.insert(f.ty.clone());
            strings.insert(f.name.clone());
        }
        for m in &c.methods {
            types.insert(m.ret.clone());
            types.extend(m.params.iter().cloned());
            strings.insert(m.name.clone());
            strings.insert(m.literal.clone());
            strings.insert(m.shorty());
            if let Some(ty) = &m.catches {
                types.insert(ty.clone());
            }
            if m.annotated {
                types.insert(MARKER.to_string());
            }
        }
    }
    strings.extend(types.iter().cloned());

    let mut b = DexBuilder::new();
    let string_idx: BTreeMap<&str, u32> =
        strings.iter().map(|s| (s.as_str(), b.add_string(s))).collect();
    let type_idx: BTreeMap<&str, u32> =
        types.iter().map(|t| (t.as_str(), b.add_type(string_idx[t.as_str()]))).collect();
    let s = |v: &str| string_idx[v];
    let t = |v: &str| type_idx[v];
    let type_list = |tys: &[String]| tys.iter().map(|ty| t(ty) as u16).collect::<Vec<u16>>();

    // type lists in content order
    let mut lists: BTreeSet<Vec<u16>> = BTreeSet::new();
    for c in &classes {
        lists.insert(type_list(&c.interfaces));
        for m in &c.methods {
            lists.insert(type_list(&m.params));
        }
    }
    lists.remove(&vec![]);
    let list_handles: BTreeMap<Vec<u16>, u32> =
        lists.into_iter().map(|l| (l.clone(), b.add_type_list(TypeList { types: l }))).collect();
    let list_off = |tys: &[String]| list_handles.get(&type_list(tys)).copied().unwrap_or(0);

    // protos by (return type, parameters)
    let mut protos: BTreeMap<(u32, Vec<u16>), u32> = BTreeMap::new();
    for m in classes.iter().flat_map(|c| &c.methods) {
        protos.insert((t(&m.ret), type_list(&m.params)), s(&m.shorty()));
    }
    let mut proto_idx = BTreeMap::new();
    for ((ret, params), shorty) in &protos {
        let parameters_off = list_handles.get(params).copied().unwrap_or(0);
        let idx = b.add_proto(ProtoId { shorty_idx: *shorty, return_type_idx: *ret, parameters_off });
        proto_idx.insert((*ret, params.clone()), idx);
    }
    let proto = |m: &Method| proto_idx[&(t(&m.ret), type_list(&m.params))];

    // fields by (class, name, type), methods by (class, name, proto)
    let mut fields = BTreeSet::new();
    let mut methods = BTreeSet::new();
    for c in &classes {
        let ci = t(&c.descriptor) as u16;
        for f in &c.fields {
            fields.insert((ci, s(&f.name), t(&f.ty) as u16));
        }
        for m in &c.methods {
            methods.insert((ci, s(&m.name), proto(m) as u16));
        }
    }
    let mut field_idx = BTreeMap::new();
    for (class_idx, name_idx, type_idx) in fields {
        field_idx.insert((class_idx, name_idx), b.add_field(FieldId { class_idx, type_idx, name_idx }));
    }
    let mut method_idx = BTreeMap::new();
    for (class_idx, name_idx, proto_idx) in methods {
        method_idx.insert((class_idx, name_idx), b.add_method(MethodId { class_idx, proto_idx, name_idx }));
    }
    let method_of = |class: &str, name: &str| method_idx[&(t(class) as u16, s(name))];

    let mut annotations = Interner::new();
    let mut sets = Interner::new();
    let mut ref_lists = Interner::new();
    let mut directories = Interner::new();
    let mut arrays = Interner::new();
    let mut debug_infos = Interner::new();
    let mut codes = Interner::new();

    for c in &classes {
        let ci = t(&c.descriptor) as u16;

        let mut class_set = 0;
        if let Some(ty) = &c.annotation {
            let a = annotations.get_or(marker_annotation(t(MARKER), s("value"), t(ty)), |i| b.add_annotation(i));
            class_set = sets.get_or(AnnotationSetItem { entries: vec![a] }, |i| b.add_annotation_set(i));
        }

        let mut ordered: Vec<&Method> = c.methods.iter().collect();
        ordered.sort_by_key(|m| method_of(&c.descriptor, &m.name));

        let mut method_annotations = vec![];
        let mut parameter_annotations = vec![];
        for m in ordered.iter().filter(|m| m.annotated) {
            let midx = method_of(&c.descriptor, &m.name);
            let a = annotations.get_or(marker_annotation(t(MARKER), s("value"), t(&c.descriptor)), |i| {
                b.add_annotation(i)
            });
            let set = sets.get_or(AnnotationSetItem { entries: vec![a] }, |i| b.add_annotation_set(i));
            let list = ref_lists.get_or(AnnotationSetRefList { list: vec![set] }, |i| b.add_annotation_set_ref_list(i));
            method_annotations.push((midx, set));
            parameter_annotations.push((midx, list));
        }
        let annotations_off = if class_set == 0 && method_annotations.is_empty() {
            0
        } else {
            let dir = AnnotationsDirectoryItem {
                class_annotations_off: class_set,
                field_annotations: vec![],
                method_annotations,
                parameter_annotations,
            };
            directories.get_or(dir, |i| b.add_annotations_directory(i))
        };

        let statics = c.fields.iter().filter(|f| f.is_static).count();
        let static_values_off = match &c.static_value {
            Some(v) if statics > 0 => arrays.get_or(static_values(statics, s(v)), |i| b.add_encoded_array(i)),
            _ => 0,
        };

        let mut data = ClassDataItem::default();
        let mut encoded_fields: Vec<(u32, bool)> =
            c.fields.iter().map(|f| (field_idx[&(ci, s(&f.name))], f.is_static)).collect();
        encoded_fields.sort();
        for (field_idx, is_static) in encoded_fields {
            let access_flags = if is_static { ACC_PUBLIC | ACC_STATIC } else { ACC_PUBLIC };
            let field = EncodedField { field_idx, access_flags };
            if is_static {
                data.static_fields.push(field);
            } else {
                data.instance_fields.push(field);
            }
        }

        for m in &ordered {
            let debug = DebugInfoItem {
                line_start: m.line,
                parameter_names: m.params.iter().map(|_| s("arg")).collect(),
                program: vec![
                    DebugOp::SetPrologueEnd,
                    DebugOp::StartLocal { register: 0, name_idx: s("local"), type_idx: t("I") },
                    DebugOp::Special(0x0e),
                ],
            };
            let debug_info_off = debug_infos.get_or(debug, |i| b.add_debug_info(i));

            let mut insns = vec![0x001a, s(&m.literal) as u16];
            if let Some((class, name)) = &m.calls {
                insns.extend([0x0071, method_of(class, name) as u16, 0x0000]);
            }
            insns.push(0x000e);
            let ins_size = m.params.len() as u16 + if m.is_static { 0 } else { 1 };
            let (tries, handlers) = match &m.catches {
                Some(ty) => (
                    vec![TryItem { start_addr: 0, insn_count: 2, handler_index: 0 }],
                    vec![CatchHandler { handlers: vec![(t(ty), 2)], catch_all_addr: None }],
                ),
                None => (vec![], vec![]),
            };
            let code = CodeItem {
                registers_size: ins_size + 1,
                ins_size,
                outs_size: 0,
                debug_info_off,
                insns,
                tries,
                handlers,
            };
            let code_off = codes.get_or(code, |i| b.add_code(i));

            let mut access_flags = ACC_PUBLIC;
            if m.is_static {
                access_flags |= ACC_STATIC;
            }
            if m.name.starts_with('<') {
                access_flags |= ACC_CONSTRUCTOR;
            }
            let method = EncodedMethod { method_idx: method_of(&c.descriptor, &m.name), access_flags, code_off };
            if m.is_direct() {
                data.direct_methods.push(method);
            } else {
                data.virtual_methods.push(method);
            }
        }

        let class_data_off = if data == ClassDataItem::default() { 0 } else { b.add_class_data(data) };
        b.add_class_def(ClassDef {
            class_idx: ci as u32,
            access_flags: ACC_PUBLIC,
            superclass_idx: t(OBJECT),
            interfaces_off: list_off(&c.interfaces),
            source_file_idx: s(&c.source),
            annotations_off,
            class_data_off,
            static_values_off,
        });
    }

    b.build().unwrap()
}


/// The first version of a three class app.
pub(crate) fn app_v1() -> Vec<Class> {
    vec![
        Class::new("Lcom/example/app/Main;")
            .implements("Ljava/lang/Runnable;")
            .field("counter", "I")
            .static_field("TAG", "Ljava/lang/String;", "main")
            .annotated_with("Lcom/example/app/Util;")
            .method(Method::new("<init>", 10))
            .method(Method::new("onCreate", 20).calls("Lcom/example/app/Util;", "helper"))
            .method(Method::new("run", 30)),
        Class::new("Lcom/example/app/Util;")
            .method(Method::new("helper", 40).statik().param("I").catches("Ljava/lang/Exception;"))
            .method(Method::new("format", 50).statik().returns("Ljava/lang/String;").annotated()),
        Class::new("Lcom/example/loader/Loader;").method(Method::new("load", 60).statik().param("Ljava/lang/String;")),
    ]
}

/// A second version: a new method ahead of `onCreate` reindexes every later method, a
/// field goes away, a literal changes and a class is added.
pub(crate) fn app_v2() -> Vec<Class> {
    vec![
        Class::new("Lcom/example/app/Main;")
            .implements("Ljava/lang/Runnable;")
            .static_field("TAG", "Ljava/lang/String;", "main-v2")
            .annotated_with("Lcom/example/app/Util;")
            .method(Method::new("<init>", 10))
            .method(Method::new("attach", 15).param("Landroid/content/Context;"))
            .method(Method::new("onCreate", 20).calls("Lcom/example/app/Util;", "helper"))
            .method(Method::new("run", 30).literal("running")),
        Class::new("Lcom/example/app/Util;")
            .method(Method::new("helper", 40).statik().param("I").catches("Ljava/lang/Exception;"))
            .method(Method::new("format", 50).statik().returns("Ljava/lang/String;").annotated()),
        Class::new("Lcom/example/app/Extra;")
            .implements("Ljava/lang/Runnable;")
            .method(Method::new("run", 70).calls("Lcom/example/app/Util;", "format")),
        Class::new("Lcom/example/loader/Loader;").method(Method::new("load", 60).statik().param("Ljava/lang/String;")),
    ]
}
