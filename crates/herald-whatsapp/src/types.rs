// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cloud API request and response bodies.

use herald_core::{SendRequest, VariableMapping};
use serde::{Deserialize, Serialize};

/// Body of `POST /{version}/{phone_number_id}/messages` for a template.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub template: Template,
    /// Echoed back on status webhooks. Carries the idempotency key.
    pub biz_opaque_callback_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: String,
}

/// One filled template section.
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub parameter_type: &'static str,
    pub text: String,
}

impl Parameter {
    fn text(value: &str) -> Self {
        Self {
            parameter_type: "text",
            text: value.to_string(),
        }
    }
}

impl TemplateMessage {
    pub fn from_request(request: &SendRequest) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: request.phone.clone(),
            message_type: "template",
            template: Template {
                name: request.template_name.clone(),
                language: Language {
                    code: request.language.clone(),
                },
                components: components(&request.components),
            },
            biz_opaque_callback_data: request.idempotency_key.clone(),
        }
    }
}

/// Header and body become one component each; every button variable fills
/// the dynamic suffix of the URL button at its position.
fn components(mapping: &VariableMapping) -> Vec<Component> {
    let mut out = Vec::new();
    for (component_type, values) in [("header", &mapping.header), ("body", &mapping.body)] {
        if !values.is_empty() {
            out.push(Component {
                component_type,
                sub_type: None,
                index: None,
                parameters: values.iter().map(|v| Parameter::text(v)).collect(),
            });
        }
    }
    for (i, value) in mapping.buttons.iter().enumerate() {
        out.push(Component {
            component_type: "button",
            sub_type: Some("url"),
            index: Some(i.to_string()),
            parameters: vec![Parameter::text(value)],
        });
    }
    out
}

/// Successful send response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<MessageId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageId {
    pub id: String,
}

/// Graph API error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}
