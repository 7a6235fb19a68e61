use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, models, notify, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::access::check_route,
		routes::access::evaluate_policy,
		routes::access::navigation,
		routes::admin::list_profiles,
		routes::admin::upsert_profile,
		routes::admin::update_role,
		routes::admin::update_approval,
		routes::admin::update_module
	),
	components(
		schemas(
			authz::Role,
			authz::ModuleId,
			authz::Verdict,
			notify::NotificationCategory,
			notify::Notification,
			models::access::AccessCheckRequest,
			models::access::PolicyRequest,
			models::access::PolicyEvaluateRequest,
			models::access::RedirectResponse,
			models::access::AccessResponse,
			models::access::NavEntryResponse,
			models::access::NavigationResponse,
			models::profile::Profile,
			models::profile::ProfileUpsertRequest,
			models::profile::RoleUpdateRequest,
			models::profile::ApprovalUpdateRequest,
			models::profile::ModuleGrantRequest,
			routes::health::HealthResponse
		)
	),
	tags(
		(name = "Access", description = "Access resolution for protected resources"),
		(name = "Admin", description = "Profile administration"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc);
	ensure_openapi_version(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root(doc: &mut Value) -> Option<&mut Map<String, Value>> {
	doc.as_object_mut()
}

fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = root(doc) else { return; };
	let Some(components) = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};
	let Some(schemes) = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_openapi_version(doc: &mut Value) {
	if let Some(root) = root(doc) {
		root.entry("openapi")
			.or_insert_with(|| Value::String("3.1.0".to_string()));
	}
}

fn add_examples(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		for item in paths.values_mut() {
			if let Some(operations) = item.as_object_mut() {
				for operation in operations.values_mut() {
					apply_parameter_examples(operation);
					apply_request_examples(operation);
					apply_response_examples(operation);
				}
			}
		}
	}
}

fn apply_parameter_examples(operation: &mut Value) {
	let Some(parameters) = operation.get_mut("parameters").and_then(Value::as_array_mut) else { return; };

	for parameter in parameters.iter_mut() {
		let example = match parameter.get("name").and_then(Value::as_str) {
			Some("user_id") => json!("00000000-0000-0000-0000-000000000000"),
			Some("module") => json!("gestao_riscos"),
			_ => continue,
		};
		if let Some(obj) = parameter.as_object_mut() {
			obj.entry("example").or_insert(example);
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(request_body) = operation.get_mut("requestBody") else { return; };
	let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else { return; };
	let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { return; };
	let Some(schema) = app_json.get("schema").and_then(Value::as_object) else { return; };
	let Some(reference) = schema.get("$ref").and_then(Value::as_str) else { return; };

	let example = match reference {
		"#/components/schemas/AccessCheckRequest" => Some(json!({ "path": "/auditoria" })),
		"#/components/schemas/PolicyEvaluateRequest" => Some(json!({
			"path": "/riscos",
			"policy": { "allowed_roles": ["master", "proprietario"], "required_module": "gestao_riscos" }
		})),
		"#/components/schemas/ProfileUpsertRequest" => Some(json!({
			"full_name": "Maria Souza",
			"role": "proprietario",
			"approved": true,
			"active_modules": { "gestao_riscos": true, "nps": false }
		})),
		"#/components/schemas/RoleUpdateRequest" => Some(json!({ "role": "auditor" })),
		"#/components/schemas/ApprovalUpdateRequest" => Some(json!({ "approved": true })),
		"#/components/schemas/ModuleGrantRequest" => Some(json!({ "entitled": true })),
		_ => None,
	};

	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}

fn profile_example() -> Value {
	json!({
		"user_id": "00000000-0000-0000-0000-000000000000",
		"full_name": "Maria Souza",
		"role": "proprietario",
		"approved": true,
		"active_modules": { "gestao_riscos": true },
		"created_at": "2025-10-01T10:00:00Z",
		"updated_at": "2025-10-01T10:00:00Z"
	})
}

fn apply_response_examples(operation: &mut Value) {
	let Some(responses) = operation.get_mut("responses").and_then(Value::as_object_mut) else { return; };

	for (status, response) in responses.iter_mut() {
		let Some(content) = response.get_mut("content").and_then(Value::as_object_mut) else { continue; };
		let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { continue; };
		let Some(schema) = app_json.get("schema").cloned() else { continue; };

		let example = match schema.get("$ref").and_then(Value::as_str) {
			Some("#/components/schemas/Profile") => Some(profile_example()),
			Some("#/components/schemas/AccessResponse") => Some(match status.as_str() {
				"200" => json!({ "verdict": "allow", "allowed": true, "redirect": null, "notification": null }),
				"401" => json!({
					"verdict": "deny_no_session",
					"allowed": false,
					"redirect": { "target": "login", "return_to": "/auditoria", "location": "/auth?redirect_to=%2Fauditoria" },
					"notification": null
				}),
				_ => json!({
					"verdict": "deny_role_mismatch",
					"allowed": false,
					"redirect": { "target": "dashboard", "location": "/dashboard" },
					"notification": { "category": "access_denied", "message": "Acesso negado para esta modalidade." }
				}),
			}),
			Some("#/components/schemas/NavigationResponse") => Some(json!({
				"role": "auditor",
				"entries": [
					{ "title": "Auditorias", "path": "/auditoria" },
					{ "title": "Configurações", "path": "/configuracoes" }
				]
			})),
			_ => None,
		};

		let example = example.or_else(|| {
			let is_array = schema.get("type").and_then(Value::as_str) == Some("array");
			let item_ref = schema.get("items").and_then(|items| items.get("$ref")).and_then(Value::as_str);
			match (is_array, item_ref) {
				(true, Some("#/components/schemas/Profile")) => Some(json!([profile_example()])),
				_ => None,
			}
		});

		if let Some(example) = example {
			app_json.insert("example".to_string(), example);
		}
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			if let Some(root) = root(doc) {
				root.insert("servers".to_string(), json!([{ "url": server_url }]));
			}
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
