use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of the visitor behind a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub Uuid);

impl PrincipalId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Platform roles. Exactly one per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Universal bypass: allowed everywhere, approved or not.
    Master,
    Proprietario,
    Auditor,
    Empresa,
    Secretaria,
    Treinador,
    Recepcionista,
    Manutencao,
    Estacionamento,
    /// Platform administration staff.
    TotalQualityIso,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::Master,
        Role::Proprietario,
        Role::Auditor,
        Role::Empresa,
        Role::Secretaria,
        Role::Treinador,
        Role::Recepcionista,
        Role::Manutencao,
        Role::Estacionamento,
        Role::TotalQualityIso,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Proprietario => "proprietario",
            Role::Auditor => "auditor",
            Role::Empresa => "empresa",
            Role::Secretaria => "secretaria",
            Role::Treinador => "treinador",
            Role::Recepcionista => "recepcionista",
            Role::Manutencao => "manutencao",
            Role::Estacionamento => "estacionamento",
            Role::TotalQualityIso => "total_quality_iso",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Purchasable feature areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    AxiomaMercado,
    AxiomaEstatistica,
    GestaoRiscos,
    Nps,
    Manutencao,
}

impl ModuleId {
    pub const ALL: [ModuleId; 5] = [
        ModuleId::AxiomaMercado,
        ModuleId::AxiomaEstatistica,
        ModuleId::GestaoRiscos,
        ModuleId::Nps,
        ModuleId::Manutencao,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleId::AxiomaMercado => "axioma_mercado",
            ModuleId::AxiomaEstatistica => "axioma_estatistica",
            ModuleId::GestaoRiscos => "gestao_riscos",
            ModuleId::Nps => "nps",
            ModuleId::Manutencao => "manutencao",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleId::ALL
            .into_iter()
            .find(|module| module.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "module",
                value: s.to_string(),
            })
    }
}

/// Authorization-relevant attributes of a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub role: Role,
    /// Administrative sign-off ("homologação").
    pub approved: bool,
    pub entitled_modules: HashMap<ModuleId, bool>,
}

impl ProfileRecord {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            approved: false,
            entitled_modules: HashMap::new(),
        }
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn with_module(mut self, module: ModuleId, entitled: bool) -> Self {
        self.entitled_modules.insert(module, entitled);
        self
    }

    /// Absent entries are not entitlements.
    pub fn is_entitled(&self, module: ModuleId) -> bool {
        self.entitled_modules.get(&module).copied().unwrap_or(false)
    }
}

/// Static authorization requirement declared by a protected resource.
///
/// A policy with no roles and no module only requires a live session; the
/// engine never fetches a profile for it. An empty role set is treated the
/// same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub allowed_roles: Option<BTreeSet<Role>>,
    pub required_module: Option<ModuleId>,
}

impl ResourcePolicy {
    /// Session alone suffices.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        Self {
            allowed_roles: (!roles.is_empty()).then_some(roles),
            required_module: None,
        }
    }

    pub fn module(module: ModuleId) -> Self {
        Self {
            allowed_roles: None,
            required_module: Some(module),
        }
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.required_module = Some(module);
        self
    }

    fn role_set(&self) -> Option<&BTreeSet<Role>> {
        self.allowed_roles.as_ref().filter(|roles| !roles.is_empty())
    }

    pub fn requires_profile(&self) -> bool {
        self.role_set().is_some() || self.required_module.is_some()
    }

    /// `true` when the policy has no role restriction or lists `role`.
    pub fn permits_role(&self, role: Role) -> bool {
        self.role_set().map_or(true, |roles| roles.contains(&role))
    }
}
