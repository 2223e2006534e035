//! Tipos trocados com os serviços externos (Matchmaker e Policy Manager).
//!
//! Todos os tipos derivam `Serialize`/`Deserialize` via serde para
//! conversão automática de/para JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coordinator::Component;

/// Resposta do Matchmaker: o descritor da aplicação aumentado com a
/// colocação resolvida de cada componente.
///
/// Só os campos presentes na resposta sobrescrevem o descritor original.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchmakerResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Lista de componentes resolvidos. Substitui a lista original por inteiro.
    #[serde(default)]
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub manifests: Option<Vec<serde_yaml::Value>>,
}

/// Notificação enviada ao Policy Manager quando um grupo é criado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Identificador do grupo de jobs criado.
    pub app_instance: String,
    /// Ação que o Policy Manager deve invocar quando detectar uma violação.
    pub common_action: Action,
    /// Nome do serviço que registra a aplicação.
    pub service: String,
    /// Documento original submetido pelo usuário.
    #[serde(rename = "app_descriptor")]
    pub manifest: String,
}

/// Callback HTTP registrado no Policy Manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub uri: String,
    pub http_method: String,
    /// Se o Policy Manager deve repassar o token de acesso na chamada.
    pub include_access_token: bool,
    #[serde(default)]
    pub extra_parameters: BTreeMap<String, String>,
}

impl Notification {
    /// Notificação padrão para um grupo recém-criado.
    pub fn for_group(group_id: &str, descriptor: &str) -> Self {
        Self {
            app_instance: group_id.to_string(),
            common_action: Action {
                uri: "/jobmanager/policies/incompliance/create".to_string(),
                http_method: "POST".to_string(),
                include_access_token: true,
                extra_parameters: BTreeMap::new(),
            },
            service: "job-manager".to_string(),
            manifest: descriptor.to_string(),
        }
    }
}
