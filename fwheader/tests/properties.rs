use fwheader::{
    header::{
        build_header, compute_integrity_hash, read_header, seal_header, spec, FieldName,
        FieldValue, HeaderFields, TextOverflow, HEADER_SIZE,
    },
    FirmwareImage,
};
use proptest::prelude::*;

prop_compose! {
    fn header_fields()(
        model_name in "\\PC{0,80}",
        cpo_id in "\\PC{0,40}",
        version in proptest::array::uniform3(any::<u8>()),
        image_type in any::<u8>(),
        debug_level in any::<u8>(),
        length in any::<u32>(),
    ) -> HeaderFields {
        let mut fields = HeaderFields::new();
        fields.insert(FieldName::Length, length);
        fields.insert(FieldName::ModelName, model_name.as_str());
        fields.insert(FieldName::CpoId, cpo_id.as_str());
        fields.insert(FieldName::Version, FieldValue::Hex(hex::encode(version)));
        fields.insert(FieldName::ImageType, FieldValue::Hex(format!("{image_type:x}")));
        fields.insert(FieldName::DebugLevel, FieldValue::Hex(format!("0x{debug_level:02x}")));
        fields
    }
}

proptest! {
    #[test]
    fn sealed_images_read_back(fields in header_fields(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let header = build_header(&fields).unwrap();
        prop_assert_eq!(header.len(), HEADER_SIZE);

        let digest = compute_integrity_hash(&header, &payload);
        let mut image = seal_header(header, &digest).to_vec();
        image.extend_from_slice(&payload);

        let read = read_header(&image).unwrap();
        prop_assert_eq!(read.content_hash(), Some(&digest));
        prop_assert_eq!(read.length(), fields.length());

        for name in [FieldName::ModelName, FieldName::CpoId] {
            let range = spec(name).range();
            let text = fields.get(name).and_then(FieldValue::as_str).unwrap().as_bytes();
            let kept = text.len().min(range.len());

            // Text is cut at the field size and zero-padded
            prop_assert_eq!(&header[range.start..range.start + kept], &text[..kept]);
            prop_assert!(header[range.start + kept..range.end].iter().all(|b| *b == 0));
            if text.len() <= range.len() {
                prop_assert_eq!(read.get(name), fields.get(name));
            }
        }

        // Re-sealing without edits reproduces the same header
        let mut resealed = FirmwareImage::from_bytes(&image).unwrap();
        prop_assert!(resealed.is_sealed());
        resealed.update(&HeaderFields::new(), TextOverflow::Truncate).unwrap();
        prop_assert_eq!(resealed.to_bytes(), image);
    }

    #[test]
    fn any_payload_byte_changes_the_digest(
        fields in header_fields(),
        payload in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..,
    ) {
        let header = build_header(&fields).unwrap();
        let original = compute_integrity_hash(&header, &payload);

        let mut tampered = payload.clone();
        tampered[index.index(payload.len())] ^= flip;

        prop_assert_ne!(original, compute_integrity_hash(&header, &tampered));
    }

    #[test]
    fn digest_bytes_do_not_affect_the_digest(fields in header_fields(), junk in any::<[u8; 32]>()) {
        let header = build_header(&fields).unwrap();
        let dirty = seal_header(header, &junk);

        prop_assert_eq!(
            compute_integrity_hash(&header, b"payload"),
            compute_integrity_hash(&dirty, b"payload")
        );
    }
}
