//! JSON↔Proto bridge (§4.2). Outgoing JSON is canonical Protobuf JSON: proto
//! field names, enums as strings, bytes as base64. Incoming JSON goes
//! through a mutable `DynamicMessage` (the compiled type itself is meant to
//! stay read-only) and is re-encoded to wire Protobuf before being handed
//! back through the optimized decode path.

use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor};
use serde::Serialize;

pub fn encode(msg: &DynamicMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::new(&mut out);
    msg.serialize(&mut ser)?;
    Ok(out)
}

pub fn decode(
    descriptor: MessageDescriptor,
    bytes: &[u8],
    options: DeserializeOptions,
) -> Result<DynamicMessage, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let msg = DynamicMessage::deserialize_with_options(descriptor, &mut de, &options)?;
    de.end()?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::{DescriptorPool, Value};

    fn descriptor() -> MessageDescriptor {
        let mut set = prost_types::FileDescriptorSet::default();
        set.file.push(prost_types::FileDescriptorProto {
            name: Some("json_test.proto".to_string()),
            package: Some("jt.v1".to_string()),
            message_type: vec![prost_types::DescriptorProto {
                name: Some("Greeting".to_string()),
                field: vec![prost_types::FieldDescriptorProto {
                    name: Some("name".to_string()),
                    number: Some(1),
                    label: Some(prost_types::field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(prost_types::field_descriptor_proto::Type::String as i32),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        });
        DescriptorPool::from_file_descriptor_set(set)
            .unwrap()
            .get_message_by_name("jt.v1.Greeting")
            .unwrap()
    }

    #[test]
    fn round_trips_through_canonical_json() {
        let desc = descriptor();
        let mut msg = DynamicMessage::new(desc.clone());
        msg.set_field_by_name("name", Value::String("Ada".into()));

        let json = encode(&msg).unwrap();
        assert!(String::from_utf8_lossy(&json).contains("\"name\":\"Ada\""));

        let decoded = decode(desc, &json, DeserializeOptions::new()).unwrap();
        assert_eq!(
            decoded.get_field_by_name("name").unwrap().as_str(),
            Some("Ada")
        );
    }

    #[test]
    fn unknown_fields_rejected_when_disallowed() {
        let desc = descriptor();
        let options = DeserializeOptions::new().deny_unknown_fields(true);
        let result = decode(desc, br#"{"name":"Ada","bogus":1}"#, options);
        assert!(result.is_err());
    }
}
