//! Protected application paths and the policy each one declares.

use super::model::{ModuleId, ResourcePolicy, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRoute {
    pub path: &'static str,
    pub title: &'static str,
    pub allowed_roles: &'static [Role],
    pub required_module: Option<ModuleId>,
}

impl ProtectedRoute {
    pub fn policy(&self) -> ResourcePolicy {
        let policy = ResourcePolicy::roles(self.allowed_roles.iter().copied());
        match self.required_module {
            Some(module) => policy.with_module(module),
            None => policy,
        }
    }
}

pub const ROUTES: &[ProtectedRoute] = &[
    ProtectedRoute {
        path: "/dashboard",
        title: "Dashboard",
        allowed_roles: &[],
        required_module: None,
    },
    ProtectedRoute {
        path: "/admin",
        title: "Administração",
        allowed_roles: &[Role::Master],
        required_module: None,
    },
    ProtectedRoute {
        path: "/auditoria",
        title: "Painel de Auditoria ISO",
        allowed_roles: &[Role::Auditor, Role::TotalQualityIso],
        required_module: None,
    },
    ProtectedRoute {
        path: "/configuracoes",
        title: "Configurações",
        allowed_roles: &[Role::TotalQualityIso],
        required_module: None,
    },
    ProtectedRoute {
        path: "/documentos",
        title: "Documentos",
        allowed_roles: &[Role::Empresa, Role::TotalQualityIso],
        required_module: None,
    },
    ProtectedRoute {
        path: "/riscos",
        title: "Gestão de Riscos",
        allowed_roles: &[Role::Master, Role::Proprietario],
        required_module: Some(ModuleId::GestaoRiscos),
    },
    ProtectedRoute {
        path: "/nps",
        title: "NPS",
        allowed_roles: &[],
        required_module: Some(ModuleId::Nps),
    },
    ProtectedRoute {
        path: "/manutencao",
        title: "Manutenção",
        allowed_roles: &[Role::Proprietario, Role::Manutencao],
        required_module: Some(ModuleId::Manutencao),
    },
    ProtectedRoute {
        path: "/estacionamento",
        title: "Estacionamento",
        allowed_roles: &[Role::Proprietario, Role::Estacionamento],
        required_module: None,
    },
    ProtectedRoute {
        path: "/secretaria",
        title: "Secretaria",
        allowed_roles: &[Role::Proprietario, Role::Secretaria, Role::Recepcionista],
        required_module: None,
    },
    ProtectedRoute {
        path: "/treinador",
        title: "Treinador",
        allowed_roles: &[Role::Proprietario, Role::Treinador],
        required_module: None,
    },
    ProtectedRoute {
        path: "/mercado",
        title: "Axioma Mercado",
        allowed_roles: &[],
        required_module: Some(ModuleId::AxiomaMercado),
    },
    ProtectedRoute {
        path: "/estatistica",
        title: "Axioma Estatística",
        allowed_roles: &[],
        required_module: Some(ModuleId::AxiomaEstatistica),
    },
];

/// Strips query/fragment and a trailing slash.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// `None` for paths that are not protected resources.
pub fn find(path: &str) -> Option<&'static ProtectedRoute> {
    let path = normalize_path(path);
    ROUTES.iter().find(|route| route.path == path)
}
