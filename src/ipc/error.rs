use serde_json::json;

/// HTTP-style status class for each error code, carried in the envelope so
/// the boundary layer can map responses onto transport status lines without
/// re-deriving the taxonomy.
fn status_for(code: &str) -> u16 {
    match code {
        "invalid_input" | "bad_params" | "bad_json" | "no_workspace" | "not_implemented" => 400,
        "unauthenticated" => 401,
        "forbidden" => 403,
        "not_found" => 404,
        "conflict" => 409,
        _ => 500,
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "status": status_for(code),
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}
