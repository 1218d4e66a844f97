use super::*;
use proptest::prelude::*;

#[test]
fn test_kind_roundtrips_through_str() {
    for kind in [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::Document,
        MessageKind::Audio,
        MessageKind::Video,
    ] {
        assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
    }
    assert!("sticker".parse::<MessageKind>().is_err());
}

#[test]
fn test_text_is_not_media() {
    assert!(!MessageKind::Text.is_media());
    assert!(MessageKind::Document.is_media());
}

#[test]
fn test_metadata_serializes_only_present_fields() {
    let meta = MessageMetadata {
        original_media_id: Some("M1".into()),
        ..MessageMetadata::default()
    };
    let json = serde_json::to_value(&meta).unwrap();
    assert_eq!(json, serde_json::json!({"original_media_id": "M1"}));

    let empty = serde_json::to_string(&MessageMetadata::default()).unwrap();
    assert_eq!(empty, "{}");
}

#[test]
fn test_new_media_records_original_id() {
    let msg = InboundMessage::new_media("wamid.1", "org1", "5731", MessageKind::Image, "M1", None);
    assert_eq!(msg.media_id(), Some("M1"));
    assert!(msg.metadata.is_recoverable(msg.kind));
    assert!(msg.metadata.needs_upload());
}

#[test]
fn test_media_without_any_reference_is_not_recoverable() {
    let meta = MessageMetadata::default();
    assert!(!meta.is_recoverable(MessageKind::Audio));
    assert!(meta.is_recoverable(MessageKind::Text));

    let blank = MessageMetadata {
        original_media_id: Some(String::new()),
        ..MessageMetadata::default()
    };
    assert!(!blank.is_recoverable(MessageKind::Video));
}

#[test]
fn test_attach_keeps_original_id() {
    let mut msg =
        InboundMessage::new_media("wamid.1", "org1", "5731", MessageKind::Document, "M9", None);
    msg.attach(&StorageReference {
        bucket: "messaging-media".into(),
        key: "org1/wamid.1".into(),
        content_type: "application/pdf".into(),
    });
    assert_eq!(msg.metadata.storage_path.as_deref(), Some("org1/wamid.1"));
    assert_eq!(msg.metadata.original_media_id.as_deref(), Some("M9"));
    assert!(!msg.metadata.needs_upload());
}

#[test]
fn test_merge_never_drops_storage_path() {
    let mut stored = MessageMetadata {
        original_media_id: Some("M1".into()),
        storage_path: Some("org1/msg42".into()),
        content_type: Some("image/jpeg".into()),
    };
    let redelivery = MessageMetadata {
        original_media_id: Some("M1".into()),
        storage_path: None,
        content_type: None,
    };
    stored.merge(&redelivery);
    assert_eq!(stored.storage_path.as_deref(), Some("org1/msg42"));
    assert_eq!(stored.content_type.as_deref(), Some("image/jpeg"));
}

#[test]
fn test_merge_adds_storage_path_from_newer() {
    let mut stored = MessageMetadata {
        original_media_id: Some("M1".into()),
        ..MessageMetadata::default()
    };
    stored.merge(&MessageMetadata {
        original_media_id: Some("M1".into()),
        storage_path: Some("org1/msg42".into()),
        content_type: Some("image/png".into()),
    });
    assert_eq!(stored.storage_path.as_deref(), Some("org1/msg42"));
    assert_eq!(stored.original_media_id.as_deref(), Some("M1"));
    assert_eq!(stored.content_type.as_deref(), Some("image/png"));
}

#[test]
fn test_merge_keeps_served_content_type_of_stored_upload() {
    let mut stored = MessageMetadata {
        original_media_id: Some("A1".into()),
        storage_path: Some("org1/msg7".into()),
        content_type: Some("audio/ogg".into()),
    };
    let snapshot = stored.clone();
    stored.merge(&MessageMetadata {
        original_media_id: Some("A1".into()),
        storage_path: Some("org1/msg7".into()),
        content_type: Some("audio/ogg; codecs=opus".into()),
    });
    assert_eq!(stored, snapshot);
}

#[test]
fn test_media_asset_debug_hides_bytes() {
    let asset = MediaAsset {
        media_id: "M1".into(),
        content_type: "image/png".into(),
        bytes: vec![0u8; 2048],
    };
    let dbg = format!("{asset:?}");
    assert!(dbg.contains("len: 2048"));
    assert!(!dbg.contains("[0, 0"));
}

fn opt_id() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[A-Za-z0-9._-]{1,24}")
}

fn metadata() -> impl Strategy<Value = MessageMetadata> {
    (opt_id(), opt_id(), opt_id()).prop_map(|(original_media_id, storage_path, content_type)| {
        MessageMetadata {
            original_media_id,
            storage_path,
            content_type,
        }
    })
}

proptest! {
    #[test]
    fn merge_never_loses_references(stored in metadata(), newer in metadata()) {
        let mut merged = stored.clone();
        merged.merge(&newer);
        if stored.original_media_id.is_some() {
            prop_assert_eq!(&merged.original_media_id, &stored.original_media_id);
        }
        if stored.storage_path.is_some() {
            prop_assert!(merged.storage_path.is_some());
        }
        if stored.storage_path.is_some() {
            prop_assert_eq!(&merged.storage_path, &stored.storage_path);
            prop_assert_eq!(&merged.content_type, &stored.content_type);
        } else if newer.storage_path.is_some() {
            prop_assert_eq!(&merged.storage_path, &newer.storage_path);
        }
    }

    #[test]
    fn merge_keeps_media_recoverable(stored in metadata(), newer in metadata()) {
        let mut merged = stored.clone();
        merged.merge(&newer);
        if stored.is_recoverable(MessageKind::Image) {
            prop_assert!(merged.is_recoverable(MessageKind::Image));
        }
    }
}
