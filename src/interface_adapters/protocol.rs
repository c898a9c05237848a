// Line protocol and keyframe codec shared by the socket stream and recording files.
//
// Every message is one UTF-8 line. Client lines are `JOIN:<name>` and `INPUT:<vx>,<vy>`;
// server lines are `JOIN-ACK`, `JOIN-REJECT:<reason>`, a keyframe object, or the legacy
// `STATE:` list.

use crate::domain::{EntityId, EntityObservation, Keyframe, SchemaTag, Shape};
use glam::Vec2;
use serde::{Deserialize, Serialize};

pub const JOIN_ACK: &str = "JOIN-ACK";
const JOIN_REJECT_PREFIX: &str = "JOIN-REJECT:";
const JOIN_PREFIX: &str = "JOIN:";
const INPUT_PREFIX: &str = "INPUT:";
const STATE_PREFIX: &str = "STATE:";

/// Serialized keyframe. Unknown fields are ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeDto {
    #[serde(rename = "type")]
    pub tag: String,
    pub t: f64,
    #[serde(default)]
    pub entities: Vec<EntityDto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDto {
    // Accepts string or numeric ids; entries without one are skipped.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec<f32>>,
}

impl EntityDto {
    fn from_observation(e: &EntityObservation, with_appearance: bool) -> Self {
        let mut dto = Self {
            id: Some(serde_json::Value::String(e.id.to_string())),
            x: Some(e.position.x),
            y: Some(e.position.y),
            ..Self::default()
        };
        if with_appearance {
            dto.rt = e.shape.map(|s| s.as_str().to_string());
            dto.w = e.size.map(|s| s.x);
            dto.h = e.size.map(|s| s.y);
            dto.color = e.color.map(|c| c.to_vec());
        }
        dto
    }

    fn into_observation(self) -> Option<EntityObservation> {
        let id = match self.id? {
            serde_json::Value::String(s) if !s.is_empty() => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let size = match (self.w, self.h) {
            (None, None) => None,
            (w, h) => Some(Vec2::new(w.unwrap_or(0.0), h.unwrap_or(0.0))),
        };

        // Fewer than three channels is not a colour; alpha defaults to opaque.
        let color = self.color.and_then(|c| match c.as_slice() {
            [r, g, b] => Some([*r, *g, *b, 1.0]),
            [r, g, b, a, ..] => Some([*r, *g, *b, *a]),
            _ => None,
        });

        Some(EntityObservation {
            id: EntityId::from(id),
            position: Vec2::new(self.x.unwrap_or(0.0), self.y.unwrap_or(0.0)),
            shape: self.rt.as_deref().map(Shape::from_name),
            size,
            color,
        })
    }
}

/// Outcome of decoding one line as a keyframe.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Keyframe { tag: SchemaTag, keyframe: Keyframe },
    NotKeyframe,
}

impl Decoded {
    pub fn into_keyframe(self) -> Option<Keyframe> {
        match self {
            Decoded::Keyframe { keyframe, .. } => Some(keyframe),
            Decoded::NotKeyframe => None,
        }
    }
}

/// Encodes `keyframe` as one line without a terminator.
///
/// Appearance hints are only written for recordings; live broadcasts carry positions.
pub fn encode_keyframe(keyframe: &Keyframe, tag: SchemaTag) -> Result<String, serde_json::Error> {
    let with_appearance = tag == SchemaTag::Record;
    let dto = KeyframeDto {
        tag: tag.as_str().to_string(),
        t: keyframe.timestamp(),
        entities: keyframe
            .entities()
            .iter()
            .map(|e| EntityDto::from_observation(e, with_appearance))
            .collect(),
    };
    serde_json::to_string(&dto)
}

/// Decodes a keyframe line carrying either schema tag. Anything else is `NotKeyframe`.
pub fn decode_keyframe(line: &str) -> Decoded {
    let line = line.trim();
    if !line.starts_with('{') {
        return Decoded::NotKeyframe;
    }

    let Ok(dto) = serde_json::from_str::<KeyframeDto>(line) else {
        return Decoded::NotKeyframe;
    };
    let Some(tag) = SchemaTag::parse(&dto.tag) else {
        return Decoded::NotKeyframe;
    };
    if !dto.t.is_finite() {
        return Decoded::NotKeyframe;
    }

    let entities = dto
        .entities
        .into_iter()
        .filter_map(EntityDto::into_observation)
        .collect();
    Decoded::Keyframe {
        tag,
        keyframe: Keyframe::new(dto.t, entities),
    }
}

/// Lines a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Join { name: String },
    Input { velocity: Vec2 },
    Unknown,
}

pub fn parse_client_line(line: &str) -> ClientCommand {
    let line = line.trim();
    if let Some(name) = line.strip_prefix(JOIN_PREFIX) {
        return ClientCommand::Join {
            name: name.trim().to_string(),
        };
    }
    if let Some(body) = line.strip_prefix(INPUT_PREFIX) {
        return match parse_pair(body) {
            Some(velocity) => ClientCommand::Input { velocity },
            None => ClientCommand::Unknown,
        };
    }
    ClientCommand::Unknown
}

pub fn format_join(name: &str) -> String {
    format!("{JOIN_PREFIX}{name}")
}

pub fn format_input(velocity: Vec2) -> String {
    format!("{INPUT_PREFIX}{},{}", velocity.x, velocity.y)
}

pub fn format_join_reject(reason: &str) -> String {
    format!("{JOIN_REJECT_PREFIX}{reason}")
}

/// Lines a server sends to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerLine {
    JoinAck,
    JoinReject(String),
    Keyframe(Keyframe),
    LegacyState(Vec<(EntityId, Vec2)>),
    Unknown,
}

pub fn parse_server_line(line: &str) -> ServerLine {
    let trimmed = line.trim();
    if trimmed == JOIN_ACK {
        return ServerLine::JoinAck;
    }
    if let Some(reason) = trimmed.strip_prefix(JOIN_REJECT_PREFIX) {
        return ServerLine::JoinReject(reason.trim().to_string());
    }
    if let Some(keyframe) = decode_keyframe(trimmed).into_keyframe() {
        return ServerLine::Keyframe(keyframe);
    }
    if let Some(body) = trimmed.strip_prefix(STATE_PREFIX) {
        return ServerLine::LegacyState(parse_legacy_state(body));
    }
    ServerLine::Unknown
}

/// Parses the body of a `STATE:<id>,<x>,<y>;...` line. Malformed entries are skipped.
pub fn parse_legacy_state(body: &str) -> Vec<(EntityId, Vec2)> {
    body.split(';')
        .filter_map(|entry| {
            let (id, coords) = entry.trim().split_once(',')?;
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            let position = parse_pair(coords)?;
            position.is_finite().then(|| (EntityId::from(id), position))
        })
        .collect()
}

fn parse_pair(body: &str) -> Option<Vec2> {
    let (x, y) = body.split_once(',')?;
    Some(Vec2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframe_survives_encode_then_decode() {
        let kf = Keyframe::new(12.0, vec![EntityObservation::new("P1", 10.5, -3.25)]);
        let line = encode_keyframe(&kf, SchemaTag::Wire).expect("encode");

        let Decoded::Keyframe { tag, keyframe } = decode_keyframe(&line) else {
            panic!("expected keyframe from {line}");
        };
        assert_eq!(tag, SchemaTag::Wire);
        assert_eq!(keyframe.timestamp(), 12.0);
        let p1 = &keyframe.entities()[0];
        assert_eq!(p1.id.as_str(), "P1");
        assert!((p1.position.x - 10.5).abs() < 1e-6);
        assert!((p1.position.y + 3.25).abs() < 1e-6);
    }

    #[test]
    fn wire_lines_omit_appearance_and_record_lines_keep_it() {
        let kf = Keyframe::new(
            1.0,
            vec![EntityObservation {
                shape: Some(Shape::Circle),
                size: Some(Vec2::new(4.0, 5.0)),
                color: Some([0.1, 0.2, 0.3, 0.4]),
                ..EntityObservation::new("A", 1.0, 2.0)
            }],
        );

        let wire = encode_keyframe(&kf, SchemaTag::Wire).expect("encode");
        assert!(wire.starts_with(r#"{"type":"kf""#));
        assert!(!wire.contains("color"));

        let record = encode_keyframe(&kf, SchemaTag::Record).expect("encode");
        let Decoded::Keyframe { tag, keyframe } = decode_keyframe(&record) else {
            panic!("expected keyframe");
        };
        assert_eq!(tag, SchemaTag::Record);
        assert_eq!(keyframe.entities()[0], kf.entities()[0]);
    }

    #[test]
    fn field_order_and_unknown_fields_do_not_matter() {
        let line = r#"{"entities":[{"y":2,"color":[1,0,0],"extra":{"a":[1,2]},"x":1,"id":"A"},{"id":7,"x":3.5}],"seq":9,"t":0.25,"type":"keyframe"}"#;
        let keyframe = decode_keyframe(line).into_keyframe().expect("keyframe");

        assert_eq!(keyframe.timestamp(), 0.25);
        assert_eq!(keyframe.len(), 2);
        let a = &keyframe.entities()[0];
        assert_eq!(a.position, Vec2::new(1.0, 2.0));
        assert_eq!(a.color, Some([1.0, 0.0, 0.0, 1.0]));
        let b = &keyframe.entities()[1];
        assert_eq!(b.id.as_str(), "7");
        assert_eq!(b.position, Vec2::new(3.5, 0.0));
        assert_eq!(b.shape, None);
    }

    #[test]
    fn entries_without_an_id_are_skipped() {
        let line = r#"{"type":"kf","t":1,"entities":[{"x":1,"y":1},{"id":"","x":2},{"id":"ok"}]}"#;
        let keyframe = decode_keyframe(line).into_keyframe().expect("keyframe");
        assert_eq!(keyframe.len(), 1);
        assert_eq!(keyframe.entities()[0].id.as_str(), "ok");
    }

    #[test]
    fn malformed_lines_are_not_keyframes() {
        for line in [
            r#"{"type":"kf","t":1,"entities":[{"id":"A","x":1"#,
            "STATE:A,1,2;B,3,4",
            r#"{"type":"snapshot","t":1,"entities":[]}"#,
            r#"{"type":"kf","entities":[]}"#,
            "",
            "JOIN-ACK",
        ] {
            assert_eq!(decode_keyframe(line), Decoded::NotKeyframe, "line: {line}");
        }
    }

    #[test]
    fn client_lines_parse_or_fall_back_to_unknown() {
        assert_eq!(
            parse_client_line("JOIN:alice\n"),
            ClientCommand::Join {
                name: "alice".to_string()
            }
        );
        assert_eq!(
            parse_client_line("INPUT:1.5,-2"),
            ClientCommand::Input {
                velocity: Vec2::new(1.5, -2.0)
            }
        );
        assert_eq!(parse_client_line("INPUT:1.5"), ClientCommand::Unknown);
        assert_eq!(parse_client_line("HELLO"), ClientCommand::Unknown);
        assert_eq!(
            parse_client_line(&format_input(Vec2::new(3.0, 4.0))),
            ClientCommand::Input {
                velocity: Vec2::new(3.0, 4.0)
            }
        );
    }

    #[test]
    fn server_lines_classify_ack_keyframe_and_legacy() {
        assert_eq!(parse_server_line("JOIN-ACK\r\n"), ServerLine::JoinAck);
        assert!(matches!(
            parse_server_line(r#"{"type":"kf","t":0,"entities":[]}"#),
            ServerLine::Keyframe(_)
        ));
        assert_eq!(parse_server_line("garbage"), ServerLine::Unknown);
        assert_eq!(
            parse_server_line(&format_join_reject("empty name")),
            ServerLine::JoinReject("empty name".to_string())
        );

        let ServerLine::LegacyState(entries) = parse_server_line("STATE:A,1,2;bad;B,x,4;C,5,6;")
        else {
            panic!("expected legacy state");
        };
        assert_eq!(
            entries,
            vec![
                (EntityId::from("A"), Vec2::new(1.0, 2.0)),
                (EntityId::from("C"), Vec2::new(5.0, 6.0)),
            ]
        );
    }
}
