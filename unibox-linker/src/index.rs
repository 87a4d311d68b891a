// Dependency index: what the merger knows about imported packages
//
// {
//   "packages": {
//     "lib/net": {
//       "name": "net",
//       "functions": { "dial": "lib/net.Conn", "close": null },
//       "values": { "timeout": "int" },
//       "types": ["Conn"],
//       "methods": { "Conn": { "read": "string" } }
//     }
//   }
// }

use crate::error::{MergeError, MergeResult, Phase};
use crate::typing::InferredType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Import path of the package the synthesized dispatcher registers units with
pub const RUNTIME_PACKAGE: &str = "unibox/runtime";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyIndex {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function name -> result type, `null` when it returns nothing
    #[serde(default)]
    pub functions: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, BTreeMap<String, Option<String>>>,
}

/// What a qualified reference `pkg.member` names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Function,
    Value,
    Type,
    /// Package not described by the index; anything goes
    Unknown,
}

impl DependencyIndex {
    pub fn load(path: &Path) -> MergeResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MergeError::io(Phase::Load, path, e))?;
        let index: Self =
            serde_json::from_str(&content).map_err(|e| MergeError::DependencyIndex {
                phase: Phase::Load,
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        index.validate().map_err(|message| MergeError::DependencyIndex {
            phase: Phase::Load,
            path: path.to_path_buf(),
            message,
        })?;
        Ok(index)
    }

    /// Every type string must parse
    pub fn validate(&self) -> Result<(), String> {
        for (path, info) in &self.packages {
            let results = info
                .functions
                .values()
                .flatten()
                .chain(info.values.values())
                .chain(info.methods.values().flat_map(|m| m.values().flatten()));
            for ty in results {
                if parse_type_string(ty).is_none() {
                    return Err(format!("package `{}`: invalid type `{}`", path, ty));
                }
            }
            if let Some(name) = &info.name {
                if !is_identifier(name) {
                    return Err(format!("package `{}`: invalid name `{}`", path, name));
                }
            }
        }
        Ok(())
    }

    /// The index plus the runtime package every merged program imports
    pub fn with_runtime(mut self) -> Self {
        self.packages
            .entry(RUNTIME_PACKAGE.to_string())
            .or_insert_with(runtime_package);
        self
    }

    pub fn package(&self, path: &str) -> Option<&PackageInfo> {
        self.packages.get(path)
    }

    /// Name an import without alias binds: the declared package name, or
    /// the last path segment
    pub fn package_name(&self, path: &str) -> String {
        self.package(path)
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| last_segment(path).to_string())
    }

    pub fn member_kind(&self, path: &str, member: &str) -> Option<MemberKind> {
        let Some(info) = self.package(path) else {
            return Some(MemberKind::Unknown);
        };
        if info.functions.contains_key(member) {
            Some(MemberKind::Function)
        } else if info.values.contains_key(member) {
            Some(MemberKind::Value)
        } else if info.types.iter().any(|t| t == member) {
            Some(MemberKind::Type)
        } else {
            None
        }
    }

    pub fn function_result(&self, path: &str, function: &str) -> Option<InferredType> {
        let ty = self.package(path)?.functions.get(function)?.as_deref()?;
        parse_type_string(ty)
    }

    pub fn value_type(&self, path: &str, value: &str) -> Option<InferredType> {
        parse_type_string(self.package(path)?.values.get(value)?)
    }

    pub fn method_result(&self, path: &str, ty: &str, method: &str) -> Option<InferredType> {
        let result = self.package(path)?.methods.get(ty)?.get(method)?.as_deref()?;
        parse_type_string(result)
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

fn runtime_package() -> PackageInfo {
    let mut functions = BTreeMap::new();
    functions.insert("register".to_string(), None);
    functions.insert("dispatch".to_string(), Some("int".to_string()));
    PackageInfo {
        name: Some("runtime".to_string()),
        functions,
        ..PackageInfo::default()
    }
}

pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// `int|float|string|bool`, `[T]` or `<path>.<Type>`
pub fn parse_type_string(ty: &str) -> Option<InferredType> {
    let ty = ty.trim();
    if let Some(inner) = ty.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return Some(InferredType::Slice(Box::new(parse_type_string(inner)?)));
    }
    if crate::scope::UNIVERSE_TYPES.contains(&ty) {
        return Some(InferredType::Builtin(ty.to_string()));
    }
    let (path, name) = ty.rsplit_once('.')?;
    if path.is_empty() || !is_identifier(name) {
        return None;
    }
    Some(InferredType::Dependency {
        path: path.to_string(),
        name: name.to_string(),
    })
}
