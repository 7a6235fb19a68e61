//! Dashboard navigation entries shown per role.
//!
//! Hiding an entry is cosmetic; the destination is still gated by the engine.

use super::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavEntry {
    pub title: &'static str,
    pub path: Option<&'static str>,
    hidden_for: &'static [Role],
}

impl NavEntry {
    pub fn visible_to(&self, role: Role) -> bool {
        !self.hidden_for.contains(&role)
    }
}

pub const DASHBOARD_ENTRIES: &[NavEntry] = &[
    NavEntry { title: "Documentos", path: Some("/documentos"), hidden_for: &[Role::Auditor] },
    NavEntry { title: "Não Conformidades", path: None, hidden_for: &[] },
    NavEntry { title: "Auditorias", path: Some("/auditoria"), hidden_for: &[Role::Empresa] },
    NavEntry { title: "Indicadores", path: None, hidden_for: &[] },
    NavEntry { title: "Treinamentos", path: None, hidden_for: &[] },
    NavEntry { title: "Configurações", path: Some("/configuracoes"), hidden_for: &[Role::Empresa] },
];

pub fn visible_entries(role: Role) -> Vec<NavEntry> {
    DASHBOARD_ENTRIES
        .iter()
        .filter(|entry| entry.visible_to(role))
        .copied()
        .collect()
}
