use serde_json::Value;

use crate::geometry::Action;

#[derive(Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Register {
        name: Option<String>,
        token: Option<String>,
    },
    Viewer,
    Move {
        action: Action,
        tick: u64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "register" => {
            let name = parse_optional_string(object.get("name"))?;
            let token = parse_optional_string(object.get("token"))?;
            if name.is_none() && token.is_none() {
                return None;
            }
            Some(ClientMessage::Register { name, token })
        }
        "viewer" => Some(ClientMessage::Viewer),
        "move" => {
            let action = Action::parse(object.get("action")?.as_str()?)?;
            let tick = object.get("tick")?.as_u64()?;
            Some(ClientMessage::Move { action, tick })
        }
        _ => None,
    }
}

fn parse_optional_string(value: Option<&Value>) -> Option<Option<String>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(value) => Some(Some(value.as_str()?.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_register_with_name() {
        let parsed = parse_client_message(r#"{"type":"register","name":"alice"}"#);
        assert_eq!(
            parsed,
            Some(ClientMessage::Register {
                name: Some("alice".to_string()),
                token: None,
            })
        );
    }

    #[test]
    fn parse_register_with_token() {
        let parsed = parse_client_message(r#"{"type":"register","token":"abc","name":null}"#);
        assert_eq!(
            parsed,
            Some(ClientMessage::Register {
                name: None,
                token: Some("abc".to_string()),
            })
        );
    }

    #[test]
    fn parse_register_requires_name_or_token() {
        assert_eq!(parse_client_message(r#"{"type":"register"}"#), None);
        assert_eq!(parse_client_message(r#"{"type":"register","name":7}"#), None);
    }

    #[test]
    fn parse_viewer_message() {
        assert_eq!(
            parse_client_message(r#"{"type":"viewer"}"#),
            Some(ClientMessage::Viewer)
        );
    }

    #[test]
    fn parse_move_message() {
        let parsed = parse_client_message(r#"{"type":"move","action":"TURN_LEFT","tick":12}"#);
        assert_eq!(
            parsed,
            Some(ClientMessage::Move {
                action: Action::TurnLeft,
                tick: 12,
            })
        );
    }

    #[test]
    fn parse_move_rejects_unknown_action_or_missing_tick() {
        assert_eq!(
            parse_client_message(r#"{"type":"move","action":"JUMP","tick":1}"#),
            None
        );
        assert_eq!(
            parse_client_message(r#"{"type":"move","action":"FORWARD"}"#),
            None
        );
        assert_eq!(
            parse_client_message(r#"{"type":"move","action":"FORWARD","tick":-1}"#),
            None
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_client_message("not json"), None);
        assert_eq!(parse_client_message("[]"), None);
        assert_eq!(parse_client_message(r#"{"type":"dance"}"#), None);
    }
}
