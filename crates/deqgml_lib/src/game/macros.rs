use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::GmlEnum;
use crate::ast::ExprKind;
use crate::instruction::InstanceType;

/// How a raw integer in a known position should be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroType {
    /// `self`, `other`, `all`, `noone`, `global`.
    Instance,
    Boolean,
    /// Named constants such as colors or key codes.
    Constants(FxHashMap<i64, String>),
    /// Members of an enum from the catalogue, printed as `Enum.Member`.
    Enum(String),
}

impl MacroType {
    pub fn resolve(&self, value: i64, enums: &[GmlEnum]) -> Option<ExprKind> {
        match self {
            MacroType::Instance => match InstanceType::from_i16(i16::try_from(value).ok()?) {
                it @ (InstanceType::Own
                | InstanceType::Other
                | InstanceType::All
                | InstanceType::Noone
                | InstanceType::Global) => Some(ExprKind::InstanceType(it)),
                _ => None,
            },
            MacroType::Boolean => match value {
                0 => Some(ExprKind::Boolean(false)),
                1 => Some(ExprKind::Boolean(true)),
                _ => None,
            },
            MacroType::Constants(names) => names.get(&value).map(|name| ExprKind::Macro(name.clone())),
            MacroType::Enum(enum_name) => {
                let gml_enum = enums.iter().find(|e| &e.name == enum_name)?;
                let member = gml_enum.member_for(value)?;
                Some(ExprKind::Macro(format!("{}.{}", gml_enum.name, member.name)))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroTypeRegistry {
    pub variables: FxHashMap<String, MacroType>,
    pub function_arguments: FxHashMap<String, Vec<Option<MacroType>>>,
}

impl MacroTypeRegistry {
    pub fn variable_type(&self, name: &str) -> Option<&MacroType> {
        self.variables.get(name)
    }

    pub fn function_argument_types(&self, function_name: &str) -> Option<&[Option<MacroType>]> {
        self.function_arguments.get(function_name).map(Vec::as_slice)
    }
}
