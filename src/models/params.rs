//! # VASP 控制参数存储
//!
//! 按类别存放 VASP 控制参数。每个已知参数名在注册表中只属于一个类别，
//! 设置参数时根据注册表路由并做类型检查。
//!
//! 参数快照就是 `VaspParams` 的一份克隆，变化检测直接比较各类别的 map
//! （`PartialEq` 派生），不需要手写的键集合比较。
//!
//! ## 依赖关系
//! - 被 `parsers/incar.rs`, `parsers/kpoints.rs`, `parsers/potcar.rs` 使用
//! - 被 `calculator/` 使用

use crate::error::{Result, VaspError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────
// 参数注册表
// ─────────────────────────────────────────────────────────────

const FLOAT_KEYS: &[&str] = &[
    "aexx", "aggac", "aggax", "aldac", "amin", "amix", "amix_mag", "bmix", "bmix_mag", "deper",
    "ebreak", "efield", "emax", "emin", "enaug", "encut", "encutfock", "encutgw", "hfscreen",
    "kspacing", "lambda", "nelect", "nupdown", "param1", "param2", "pomass", "potim", "sigma",
    "smass", "spring", "symprec", "time", "vdw_a1", "vdw_a2", "vdw_s6", "vdw_sr", "zab_vdw",
];

const EXP_KEYS: &[&str] = &["ediff", "ediffg", "fdstep"];

const STRING_KEYS: &[&str] = &["algo", "gga", "lreal", "metagga", "prec", "system"];

const INT_KEYS: &[&str] = &[
    "ialgo", "ibrion", "icharg", "ichain", "idipol", "images", "imix", "inimix", "iniwav",
    "iopt", "isif", "ismear", "ispin", "istart", "isym", "ivdw", "iwavpr", "kpar", "ldauprint",
    "ldautype", "lmaxmix", "lorbit", "maxmix", "nbands", "nblk", "ncore", "nedos", "nelm",
    "nelmdl", "nelmin", "nfree", "ngx", "ngxf", "ngy", "ngyf", "ngz", "ngzf", "npar", "nsim",
    "nsw", "nwrite", "voskown",
];

const BOOL_KEYS: &[&str] = &[
    "addgrid", "lasph", "lcharg", "lclimb", "lcorr", "ldau", "ldiag", "lelf", "lepsilon",
    "lhfcalc", "lnoncollinear", "loptics", "lorbit_print", "lpard", "lplane", "lscalapack",
    "lsorbit", "lvhar", "lvtot", "lwave",
];

const LIST_INT_KEYS: &[&str] = &["iband", "kpuse", "ldaul", "random_seed"];

const LIST_BOOL_KEYS: &[&str] = &["lattice_constraints"];

const LIST_FLOAT_KEYS: &[&str] = &[
    "dipol", "eint", "ferdo", "ferwe", "ldauj", "ldauu", "magmom", "qspiral", "ropt", "rwigs",
    "saxis",
];

const DICT_KEYS: &[&str] = &["ldau_luj"];

const INPUT_KEYS: &[&str] = &["xc", "pp", "kpts", "gamma"];

/// 参数类别
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParamCategory {
    FloatParams,
    ExpParams,
    StringParams,
    IntParams,
    InputParams,
    BoolParams,
    ListIntParams,
    ListBoolParams,
    ListFloatParams,
    DictParams,
}

impl ParamCategory {
    /// 所有类别，按展开（flatten）时的先后顺序
    pub const ALL: [ParamCategory; 10] = [
        ParamCategory::FloatParams,
        ParamCategory::ExpParams,
        ParamCategory::StringParams,
        ParamCategory::IntParams,
        ParamCategory::InputParams,
        ParamCategory::BoolParams,
        ParamCategory::ListIntParams,
        ParamCategory::ListBoolParams,
        ParamCategory::ListFloatParams,
        ParamCategory::DictParams,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamCategory::FloatParams => "float_params",
            ParamCategory::ExpParams => "exp_params",
            ParamCategory::StringParams => "string_params",
            ParamCategory::IntParams => "int_params",
            ParamCategory::InputParams => "input_params",
            ParamCategory::BoolParams => "bool_params",
            ParamCategory::ListIntParams => "list_int_params",
            ParamCategory::ListBoolParams => "list_bool_params",
            ParamCategory::ListFloatParams => "list_float_params",
            ParamCategory::DictParams => "dict_params",
        }
    }

    fn keys(&self) -> &'static [&'static str] {
        match self {
            ParamCategory::FloatParams => FLOAT_KEYS,
            ParamCategory::ExpParams => EXP_KEYS,
            ParamCategory::StringParams => STRING_KEYS,
            ParamCategory::IntParams => INT_KEYS,
            ParamCategory::InputParams => INPUT_KEYS,
            ParamCategory::BoolParams => BOOL_KEYS,
            ParamCategory::ListIntParams => LIST_INT_KEYS,
            ParamCategory::ListBoolParams => LIST_BOOL_KEYS,
            ParamCategory::ListFloatParams => LIST_FLOAT_KEYS,
            ParamCategory::DictParams => DICT_KEYS,
        }
    }

    /// 在注册表中查找参数所属类别
    pub fn of(key: &str) -> Option<ParamCategory> {
        let key = key.to_lowercase();
        ParamCategory::ALL
            .into_iter()
            .find(|cat| cat.keys().contains(&key.as_str()))
    }
}

impl fmt::Display for ParamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────
// 参数值
// ─────────────────────────────────────────────────────────────

/// DFT+U 单个元素的 L, U, J
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LdauSpec {
    #[serde(rename = "L")]
    pub l: i64,
    #[serde(rename = "U")]
    pub u: f64,
    #[serde(rename = "J")]
    pub j: f64,
}

/// 参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    BoolList(Vec<bool>),
    Ldau(BTreeMap<String, LdauSpec>),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::IntList(_) => "int list",
            ParamValue::FloatList(_) => "float list",
            ParamValue::BoolList(_) => "bool list",
            ParamValue::Ldau(_) => "ldau table",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(x) => Some(*x),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            ParamValue::FloatList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            ParamValue::IntList(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::FloatList(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::IntList(v)
    }
}

/// 将值转换为类别所需的类型，无法转换时返回 None
fn coerce(category: ParamCategory, key: &str, value: ParamValue) -> Option<ParamValue> {
    use ParamCategory as C;
    use ParamValue as V;

    match (category, value) {
        (C::FloatParams | C::ExpParams, V::Float(x)) => Some(V::Float(x)),
        (C::FloatParams | C::ExpParams, V::Int(i)) => Some(V::Float(i as f64)),
        (C::StringParams, V::Str(s)) => Some(V::Str(s)),
        (C::IntParams, V::Int(i)) => Some(V::Int(i)),
        (C::BoolParams, V::Bool(b)) => Some(V::Bool(b)),
        (C::ListIntParams, V::IntList(v)) => Some(V::IntList(v)),
        (C::ListBoolParams, V::BoolList(v)) => Some(V::BoolList(v)),
        (C::ListBoolParams, V::IntList(v)) if v.is_empty() => Some(V::BoolList(Vec::new())),
        (C::ListFloatParams, V::FloatList(v)) => Some(V::FloatList(v)),
        (C::ListFloatParams, V::IntList(v)) => {
            Some(V::FloatList(v.into_iter().map(|i| i as f64).collect()))
        }
        (C::DictParams, V::Ldau(m)) => Some(V::Ldau(m)),
        (C::InputParams, value) => match (key, value) {
            ("xc" | "pp", V::Str(s)) => Some(V::Str(s)),
            ("kpts", V::IntList(v)) if v.len() == 3 => Some(V::IntList(v)),
            ("gamma", V::Bool(b)) => Some(V::Bool(b)),
            _ => None,
        },
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────
// 参数存储
// ─────────────────────────────────────────────────────────────

/// 分类的 VASP 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaspParams {
    categories: BTreeMap<ParamCategory, BTreeMap<String, ParamValue>>,
}

impl Default for VaspParams {
    fn default() -> Self {
        VaspParams {
            categories: ParamCategory::ALL
                .into_iter()
                .map(|cat| (cat, BTreeMap::new()))
                .collect(),
        }
    }
}

impl VaspParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置单个参数，`ParamValue::Null` 表示删除
    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) -> Result<()> {
        let key = key.to_lowercase();
        let category = ParamCategory::of(&key)
            .ok_or_else(|| VaspError::Setup(format!("Unknown VASP parameter '{}'", key)))?;
        let value = value.into();

        if value == ParamValue::Null {
            self.category_mut(category).remove(&key);
            return Ok(());
        }

        let kind = value.kind();
        let value = coerce(category, &key, value).ok_or_else(|| {
            VaspError::Setup(format!(
                "Parameter '{}' belongs to {} and cannot take a {} value",
                key, category, kind
            ))
        })?;
        self.category_mut(category).insert(key, value);
        Ok(())
    }

    /// 批量设置
    pub fn update<I, K>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        for (key, value) in values {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        let key = key.to_lowercase();
        let category = ParamCategory::of(&key)?;
        self.category(category).get(&key)
    }

    pub fn category(&self, category: ParamCategory) -> &BTreeMap<String, ParamValue> {
        static EMPTY: BTreeMap<String, ParamValue> = BTreeMap::new();
        self.categories.get(&category).unwrap_or(&EMPTY)
    }

    fn category_mut(&mut self, category: ParamCategory) -> &mut BTreeMap<String, ParamValue> {
        self.categories.entry(category).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|m| m.is_empty())
    }

    /// 与快照相比发生变化的类别
    pub fn changed_categories(&self, snapshot: &VaspParams) -> Vec<ParamCategory> {
        ParamCategory::ALL
            .into_iter()
            .filter(|&cat| self.category(cat) != snapshot.category(cat))
            .collect()
    }

    /// 将所有非空参数展开成一个 map，键冲突时后面的类别覆盖前面的
    pub fn flatten(&self) -> BTreeMap<String, ParamValue> {
        let mut flat = BTreeMap::new();
        for cat in ParamCategory::ALL {
            for (key, value) in self.category(cat) {
                flat.insert(key.clone(), value.clone());
            }
        }
        flat
    }

    // ─────────────────────────────────────────────────────────
    // 常用参数的类型化访问
    // ─────────────────────────────────────────────────────────

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ParamValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    pub fn encut(&self) -> Option<f64> {
        self.get_f64("encut")
    }

    pub fn set_encut(&mut self, encut: f64) -> Result<()> {
        self.set("encut", encut)
    }

    pub fn kpts(&self) -> Option<[i64; 3]> {
        self.get("kpts")
            .and_then(ParamValue::as_int_list)
            .map(|v| [v[0], v[1], v[2]])
    }

    pub fn set_kpts(&mut self, kpts: [i64; 3]) -> Result<()> {
        self.set("kpts", kpts.to_vec())
    }

    pub fn gamma(&self) -> Option<bool> {
        self.get_bool("gamma")
    }

    /// 交换关联泛函名称（大写）
    ///
    /// 优先返回显式设置的 `xc`，否则返回赝势类型 `pp`。
    pub fn xc(&self) -> Result<String> {
        self.get_str("xc")
            .or_else(|| self.get_str("pp"))
            .map(|s| s.to_uppercase())
            .ok_or_else(|| VaspError::Setup("No xc or pp found.".to_string()))
    }

    pub fn set_xc(&mut self, xc: &str) -> Result<()> {
        self.set("xc", xc)
    }

    pub fn ibrion(&self) -> Option<i64> {
        self.get_i64("ibrion")
    }

    pub fn nsw(&self) -> Option<i64> {
        self.get_i64("nsw")
    }

    pub fn lorbit(&self) -> Option<i64> {
        self.get_i64("lorbit")
    }

    pub fn ispin(&self) -> Option<i64> {
        self.get_i64("ispin")
    }

    pub fn rwigs(&self) -> Option<&[f64]> {
        self.get("rwigs").and_then(ParamValue::as_float_list)
    }

    pub fn ldau_luj(&self) -> Option<&BTreeMap<String, LdauSpec>> {
        match self.get("ldau_luj") {
            Some(ParamValue::Ldau(m)) => Some(m),
            _ => None,
        }
    }

    /// 是否要求离子弛豫（写回 CONTCAR 中的新结构）
    pub fn moves_ions(&self) -> bool {
        matches!((self.ibrion(), self.nsw()), (Some(ibrion), Some(nsw)) if ibrion > -1 && nsw > 0)
    }

    /// 赝势类型：显式的 `pp`，否则由 `xc` 推断
    pub fn pp_type(&self) -> Option<String> {
        if let Some(pp) = self.get_str("pp") {
            return Some(pp.to_uppercase());
        }
        self.get_str("xc")
            .and_then(|xc| xc_tags(xc).map(|(pp, _)| pp.to_string()))
    }
}

/// 交换关联泛函对应的赝势类型与 GGA 标签
pub fn xc_tags(xc: &str) -> Option<(&'static str, Option<&'static str>)> {
    let tags = match xc.to_uppercase().as_str() {
        "LDA" => ("LDA", None),
        "PW91" => ("PW91", Some("91")),
        "PBE" => ("PBE", Some("PE")),
        "PBESOL" => ("PBE", Some("PS")),
        "RPBE" => ("PBE", Some("RP")),
        "REVPBE" => ("PBE", Some("RE")),
        "AM05" => ("PBE", Some("AM")),
        _ => return None,
    };
    Some(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_routes_keys() {
        assert_eq!(ParamCategory::of("ENCUT"), Some(ParamCategory::FloatParams));
        assert_eq!(ParamCategory::of("ediff"), Some(ParamCategory::ExpParams));
        assert_eq!(ParamCategory::of("ibrion"), Some(ParamCategory::IntParams));
        assert_eq!(ParamCategory::of("kpts"), Some(ParamCategory::InputParams));
        assert_eq!(ParamCategory::of("ldau_luj"), Some(ParamCategory::DictParams));
        assert_eq!(ParamCategory::of("not_a_tag"), None);
    }

    #[test]
    fn test_set_coerces_and_rejects() {
        let mut params = VaspParams::new();
        params.set("encut", 400i64).unwrap();
        assert_eq!(params.encut(), Some(400.0));

        params.set("magmom", vec![1i64, 2]).unwrap();
        assert_eq!(
            params.get("magmom"),
            Some(&ParamValue::FloatList(vec![1.0, 2.0]))
        );

        assert!(matches!(params.set("ibrion", 1.5), Err(VaspError::Setup(_))));
        assert!(matches!(params.set("bogus", 1i64), Err(VaspError::Setup(_))));
        assert!(params.set("kpts", vec![1i64, 2]).is_err());
    }

    #[test]
    fn test_null_removes() {
        let mut params = VaspParams::new();
        params.set("nsw", 10i64).unwrap();
        params.set("nsw", ParamValue::Null).unwrap();
        assert_eq!(params.nsw(), None);
        assert!(params.is_empty());
    }

    #[test]
    fn test_changed_categories() {
        let mut params = VaspParams::new();
        params.set("encut", 400.0).unwrap();
        let snapshot = params.clone();
        assert!(params.changed_categories(&snapshot).is_empty());

        params.set("encut", 450.0).unwrap();
        params.set("ismear", 0i64).unwrap();
        assert_eq!(
            params.changed_categories(&snapshot),
            vec![ParamCategory::FloatParams, ParamCategory::IntParams]
        );
    }

    #[test]
    fn test_changed_list_element() {
        let mut params = VaspParams::new();
        params.set("rwigs", vec![1.0, 2.0]).unwrap();
        let snapshot = params.clone();

        params.set("rwigs", vec![1.0, 2.5]).unwrap();
        assert_eq!(
            params.changed_categories(&snapshot),
            vec![ParamCategory::ListFloatParams]
        );
    }

    #[test]
    fn test_xc_accessor() {
        let mut params = VaspParams::new();
        assert!(params.xc().is_err());

        params.set("pp", "pbe").unwrap();
        assert_eq!(params.xc().unwrap(), "PBE");

        params.set_xc("pw91").unwrap();
        assert_eq!(params.xc().unwrap(), "PW91");
        assert_eq!(params.pp_type().as_deref(), Some("PBE"));
    }

    #[test]
    fn test_encut_accessor() {
        let mut params = VaspParams::new();
        assert_eq!(params.encut(), None);
        params.set_encut(520.0).unwrap();
        assert_eq!(params.encut(), Some(520.0));
        assert_eq!(params.changed_categories(&VaspParams::new()), vec![ParamCategory::FloatParams]);
    }

    #[test]
    fn test_moves_ions() {
        let mut params = VaspParams::new();
        assert!(!params.moves_ions());
        params.set("ibrion", 2i64).unwrap();
        params.set("nsw", 0i64).unwrap();
        assert!(!params.moves_ions());
        params.set("nsw", 50i64).unwrap();
        assert!(params.moves_ions());
    }

    #[test]
    fn test_untagged_values_deserialize() {
        let flat: BTreeMap<String, ParamValue> = serde_json::from_str(
            r#"{"encut": 520.0, "nsw": 10, "lwave": false, "prec": "Accurate",
                "kpts": [4, 4, 4], "rwigs": [1.2, 1.0],
                "ldau_luj": {"Fe": {"L": 2, "U": 4.0, "J": 0.0}}}"#,
        )
        .unwrap();

        let mut params = VaspParams::new();
        params.update(flat).unwrap();

        assert_eq!(params.encut(), Some(520.0));
        assert_eq!(params.nsw(), Some(10));
        assert_eq!(params.get_bool("lwave"), Some(false));
        assert_eq!(params.kpts(), Some([4, 4, 4]));
        assert_eq!(params.ldau_luj().unwrap()["Fe"].l, 2);
    }
}
