//! Command reply interpretation

use crate::{Error, Result};
use bson::{Bson, Document};

/// Check a command reply for failure
///
/// A reply fails when `ok` is not 1, or when it carries `writeErrors`
/// (write commands such as `delete` report per-statement failures with `ok: 1`).
/// The server's error is returned unchanged as [`Error::Server`].
pub fn check_command_reply(reply: Document) -> Result<Document> {
    if !is_ok(reply.get("ok")) {
        return Err(server_error(&reply));
    }

    if let Ok(write_errors) = reply.get_array("writeErrors") {
        if let Some(Bson::Document(first)) = write_errors.first() {
            return Err(server_error(first));
        }
    }

    if let Ok(concern) = reply.get_document("writeConcernError") {
        return Err(server_error(concern));
    }

    Ok(reply)
}

fn is_ok(value: Option<&Bson>) -> bool {
    match value {
        Some(Bson::Double(v)) => *v == 1.0,
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(Bson::Boolean(v)) => *v,
        _ => false,
    }
}

fn server_error(doc: &Document) -> Error {
    let code = match doc.get("code") {
        Some(Bson::Int32(c)) => *c,
        Some(Bson::Int64(c)) => *c as i32,
        Some(Bson::Double(c)) => *c as i32,
        _ => 0,
    };
    Error::Server {
        code,
        code_name: doc.get_str("codeName").unwrap_or_default().to_string(),
        message: doc
            .get_str("errmsg")
            .unwrap_or("command failed without an error message")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_ok_reply_passes_through() {
        let reply = check_command_reply(doc! { "ok": 1.0, "n": 1 }).unwrap();
        assert_eq!(reply.get_i32("n").unwrap(), 1);
        assert!(check_command_reply(doc! { "ok": 1 }).is_ok());
    }

    #[test]
    fn test_failed_reply_maps_to_server_error() {
        let err = check_command_reply(doc! {
            "ok": 0.0,
            "errmsg": "Role \"app@admin\" already exists",
            "code": 51002,
            "codeName": "Location51002",
        })
        .unwrap_err();

        match err {
            Error::Server {
                code,
                code_name,
                message,
            } => {
                assert_eq!(code, 51002);
                assert_eq!(code_name, "Location51002");
                assert_eq!(message, "Role \"app@admin\" already exists");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_ok_is_failure() {
        assert!(check_command_reply(doc! { "n": 1 }).is_err());
    }

    #[test]
    fn test_write_errors_fail_the_command() {
        let err = check_command_reply(doc! {
            "ok": 1,
            "n": 0,
            "writeErrors": [{ "index": 0, "code": 13, "errmsg": "not authorized" }],
        })
        .unwrap_err();
        assert!(matches!(err, Error::Server { code: 13, .. }));
    }
}
