//! Property tests: every message survives framing unchanged.

use outpost_protocol::{
    Command, Envelope, Message, MirrorToken, RegisterRequest, SyncExisting, SyncUserSpaces,
    Tombstone, UpdateRole, UpdateSpace, UpdateTemplate, UpdateTemplateVar, UpdateUser,
    UpdateVolume,
};
use outpost_testkit::generators::*;
use proptest::prelude::*;

fn control_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![
        Just(Message::None),
        Just(Message::Bootstrap),
        (name_strategy(), name_strategy(), text_strategy()).prop_map(
            |(version, location, session_id)| Message::Register(RegisterRequest {
                version,
                location,
                session_id,
            })
        ),
        id_list_strategy(16, 8)
            .prop_map(|existing| Message::SyncTemplates(SyncExisting { existing })),
        id_list_strategy(16, 8)
            .prop_map(|existing| Message::SyncRoles(SyncExisting { existing })),
        (uuid_strategy(), id_list_strategy(16, 8)).prop_map(|(user_id, existing)| {
            Message::SyncUserSpaces(SyncUserSpaces { user_id, existing })
        }),
        uuid_strategy().prop_map(|id| Message::DeleteSpace(Tombstone::new(id))),
        uuid_strategy().prop_map(|id| Message::DeleteTemplateVar(Tombstone::new(id))),
    ]
}

fn update_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![
        (template_strategy(), template_fields_strategy()).prop_map(|(template, update_fields)| {
            Message::UpdateTemplate(UpdateTemplate {
                template,
                update_fields,
            })
        }),
        user_strategy().prop_map(|user| Message::UpdateUser(UpdateUser { user })),
        template_var_strategy()
            .prop_map(|var| Message::UpdateTemplateVar(UpdateTemplateVar { var })),
        (space_strategy(), space_fields_strategy()).prop_map(|(space, update_fields)| {
            Message::UpdateSpace(UpdateSpace {
                space,
                update_fields,
            })
        }),
        volume_strategy().prop_map(|volume| Message::UpdateVolume(UpdateVolume { volume })),
        token_strategy().prop_map(|token| Message::MirrorToken(MirrorToken { token })),
        (role_strategy(), role_fields_strategy()).prop_map(|(role, update_fields)| {
            Message::UpdateRole(UpdateRole {
                role,
                update_fields,
            })
        }),
    ]
}

fn message_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![control_strategy(), update_strategy()]
}

proptest! {
    #[test]
    fn decode_inverts_encode(message in message_strategy()) {
        let frame = message.encode().unwrap();
        prop_assert_eq!(frame.last().copied(), Some(message.command().code()));

        let envelope = Envelope::decode(frame).unwrap();
        prop_assert_eq!(envelope.command(), message.command());
        prop_assert_eq!(Message::from_envelope(&envelope).unwrap(), message);
    }

    #[test]
    fn codes_past_the_closed_set_are_rejected(code in 22u8..=255, body in prop::collection::vec(any::<u8>(), 0..32)) {
        let mut frame = body;
        frame.push(code);
        prop_assert!(Envelope::decode(frame).is_err());
    }

    #[test]
    fn arbitrary_bytes_never_panic(frame in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Message::decode(frame);
    }
}

#[test]
fn every_command_has_a_name() {
    for command in Command::ALL {
        assert!(!command.to_string().is_empty());
    }
}
