//! End-to-end relay scenarios over the in-memory backend and a scripted
//! transport.

use std::sync::Arc;

use prost::Message as _;

use warelay::binary::{Jid, Node, NodeBuilder};
use warelay::messages::MessageUtils;
use warelay::proto::wa;
use warelay::receipt::{build_receipt, ReceiptTarget, ReceiptType};
use warelay::relay::{Relay, RelayOptions, RetryParticipant, SenderIdentity};
use warelay::store::memory::{MemorySignalRepository, MemoryStore};
use warelay::store::NS_SENDER_KEY_MEMORY;
use warelay::transport::mock::MockTransport;
use warelay::transport::TransportError;
use warelay::types::group::{build_group_metadata_node, GroupMetadata, GroupParticipant};
use warelay::types::message::AddressingMode;
use warelay::RelayConfig;

struct Fixture {
    relay: Relay,
    transport: Arc<MockTransport>,
    store: Arc<MemoryStore>,
    signal: Arc<MemorySignalRepository>,
}

fn fixture(config: RelayConfig) -> Fixture {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    let signal = Arc::new(MemorySignalRepository::new());
    let me = SenderIdentity {
        pn: "559990000000:0@s.whatsapp.net".parse().unwrap(),
        lid: Some("200000000000001:0@lid".parse().unwrap()),
        account: Some(wa::AdvSignedDeviceIdentity {
            details: Some(vec![1, 2, 3]),
            account_signature_key: Some(vec![4; 32]),
            account_signature: Some(vec![5; 64]),
            device_signature: Some(vec![6; 64]),
        }),
    };
    let relay = Relay::new(config, me, transport.clone(), store.clone(), signal.clone());
    Fixture {
        relay,
        transport,
        store,
        signal,
    }
}

fn text(body: &str) -> wa::Message {
    wa::Message {
        conversation: Some(body.to_string()),
        ..Default::default()
    }
}

fn usync_response(users: Vec<(&str, Vec<u16>)>) -> Node {
    let user_nodes: Vec<Node> = users
        .into_iter()
        .map(|(jid, device_ids)| {
            let device_nodes: Vec<Node> = device_ids
                .into_iter()
                .map(|id| NodeBuilder::new("device").attr("id", id.to_string()).build())
                .collect();
            let device_list = NodeBuilder::new("device-list").children(device_nodes).build();
            let devices = NodeBuilder::new("devices").children([device_list]).build();
            NodeBuilder::new("user")
                .attr("jid", jid)
                .children([devices])
                .build()
        })
        .collect();
    let list = NodeBuilder::new("list").children(user_nodes).build();
    let usync = NodeBuilder::new("usync").children([list]).build();
    NodeBuilder::new("iq").children([usync]).build()
}

fn prekey_response(jids: Vec<Jid>) -> Node {
    let user_nodes: Vec<Node> = jids
        .into_iter()
        .map(|jid| {
            NodeBuilder::new("user")
                .attr("jid", jid.to_string())
                .children([
                    NodeBuilder::new("registration")
                        .bytes(9u32.to_be_bytes().to_vec())
                        .build(),
                    NodeBuilder::new("identity").bytes(vec![1u8; 32]).build(),
                    NodeBuilder::new("skey")
                        .children([
                            NodeBuilder::new("id").bytes(vec![0, 0, 2]).build(),
                            NodeBuilder::new("value").bytes(vec![3u8; 32]).build(),
                            NodeBuilder::new("signature").bytes(vec![4u8; 64]).build(),
                        ])
                        .build(),
                ])
                .build()
        })
        .collect();
    let list = NodeBuilder::new("list").children(user_nodes).build();
    NodeBuilder::new("iq").children([list]).build()
}

async fn seed_sessions(signal: &MemorySignalRepository, jids: &[Jid]) {
    for jid in jids {
        signal.seed_session(&jid.to_protocol_address()).await;
    }
}

fn sent_message_stanza(nodes: &[Node]) -> &Node {
    nodes
        .iter()
        .rev()
        .find(|n| n.tag == "message")
        .expect("no <message> stanza was sent")
}

fn participant_jids(stanza: &Node) -> Vec<String> {
    stanza
        .get_optional_child("participants")
        .map(|p| {
            p.get_children_by_tag("to")
                .iter()
                .map(|to| to.attrs.get("jid").unwrap().clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a pairwise payload produced by the in-memory Signal repository.
fn decode_pairwise(ciphertext: &[u8]) -> wa::Message {
    let stripped = &ciphertext[4..];
    let unpadded = MessageUtils::unpad_message(stripped).unwrap();
    wa::Message::decode(unpadded).unwrap()
}

// 1:1 to a PN user with two devices; sender has the primary only.
#[tokio::test]
async fn direct_message_fans_out_to_every_peer_device() {
    let f = fixture(RelayConfig::default());
    let peer = Jid::pn("559980000001");

    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("559980000001@s.whatsapp.net", vec![0, 1]),
                ("559990000000@s.whatsapp.net", vec![0]),
            ]))
        })
        .await;
    seed_sessions(
        &f.signal,
        &[
            "559980000001:0@s.whatsapp.net".parse().unwrap(),
            "559980000001:1@s.whatsapp.net".parse().unwrap(),
        ],
    )
    .await;

    f.relay
        .relay_message(&peer, text("hello"), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    assert_eq!(stanza.attrs.get("type").unwrap(), "text");
    assert!(stanza.attrs.get("addressing_mode").is_none());
    assert!(stanza.attrs.get("phash").is_some());

    let participants = participant_jids(stanza);
    assert_eq!(
        participants,
        vec![
            "559980000001@s.whatsapp.net".to_string(),
            "559980000001:1@s.whatsapp.net".to_string(),
        ]
    );
    // The exact sender device never appears in its own fan-out.
    assert!(!participants.contains(&"559990000000@s.whatsapp.net".to_string()));
    // No sender-key envelope outside group sends.
    for to in stanza
        .get_optional_child("participants")
        .unwrap()
        .get_children_by_tag("to")
    {
        let enc = to.get_optional_child("enc").unwrap();
        assert_ne!(enc.attrs.get("type").unwrap(), "skmsg");
        assert_eq!(enc.attrs.get("v").unwrap(), "2");
    }
}

// Fresh peer session: the first send carries pkmsg and the device identity.
#[tokio::test]
async fn fresh_session_produces_pkmsg_and_device_identity() {
    let f = fixture(RelayConfig::default());
    let peer = Jid::pn("559980000001");

    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("559980000001@s.whatsapp.net", vec![0]),
                ("559990000000@s.whatsapp.net", vec![0]),
            ]))
        })
        .await;
    f.transport
        .expect_iq(|iq| {
            assert_eq!(iq.attrs.get("xmlns").unwrap(), "encrypt");
            Ok(prekey_response(vec![
                "559980000001@s.whatsapp.net".parse().unwrap()
            ]))
        })
        .await;

    f.relay
        .relay_message(&peer, text("first contact"), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);
    let enc = stanza
        .get_optional_child("participants")
        .unwrap()
        .get_children_by_tag("to")[0]
        .get_optional_child("enc")
        .unwrap();
    assert_eq!(enc.attrs.get("type").unwrap(), "pkmsg");
    // A pre-key message implies the device-identity child.
    assert!(stanza.get_optional_child("device-identity").is_some());
}

// A DSM-wrapped copy goes to our own other devices.
#[tokio::test]
async fn own_other_devices_receive_device_sent_message() {
    let f = fixture(RelayConfig::default());
    let peer = Jid::pn("559980000001");

    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("559980000001@s.whatsapp.net", vec![0]),
                ("559990000000@s.whatsapp.net", vec![0, 2]),
            ]))
        })
        .await;
    seed_sessions(
        &f.signal,
        &[
            "559980000001:0@s.whatsapp.net".parse().unwrap(),
            "559990000000:2@s.whatsapp.net".parse().unwrap(),
        ],
    )
    .await;

    f.relay
        .relay_message(&peer, text("outgoing"), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);
    let participants = stanza.get_optional_child("participants").unwrap();
    let companion = participants
        .get_children_by_tag("to")
        .into_iter()
        .find(|to| to.attrs.get("jid").unwrap() == "559990000000:2@s.whatsapp.net")
        .expect("own companion device missing from fan-out");

    let payload = decode_pairwise(
        companion
            .get_optional_child("enc")
            .unwrap()
            .bytes()
            .unwrap(),
    );
    let dsm = payload.device_sent_message.expect("expected a DSM wrapper");
    assert_eq!(
        dsm.destination_jid.as_deref(),
        Some("559980000001@s.whatsapp.net")
    );
    assert_eq!(
        dsm.message.unwrap().conversation.as_deref(),
        Some("outgoing")
    );

    // The peer gets the raw message, not a DSM.
    let peer_node = participants
        .get_children_by_tag("to")
        .into_iter()
        .find(|to| to.attrs.get("jid").unwrap() == "559980000001@s.whatsapp.net")
        .unwrap();
    let payload = decode_pairwise(
        peer_node
            .get_optional_child("enc")
            .unwrap()
            .bytes()
            .unwrap(),
    );
    assert!(payload.device_sent_message.is_none());
    assert_eq!(payload.conversation.as_deref(), Some("outgoing"));
}

fn lid_group_meta(group: &Jid) -> GroupMetadata {
    GroupMetadata {
        id: group.clone(),
        subject: "relay test".into(),
        addressing_mode: AddressingMode::Lid,
        participants: vec![
            GroupParticipant {
                jid: Jid::pn("559980000001"),
                lid: Some(Jid::lid("100000000000001")),
                is_admin: false,
            },
            GroupParticipant {
                jid: Jid::pn("559980000002"),
                lid: Some(Jid::lid("100000000000002")),
                is_admin: false,
            },
            GroupParticipant {
                jid: Jid::pn("559980000003"),
                lid: Some(Jid::lid("100000000000003")),
                is_admin: true,
            },
        ],
        ephemeral_duration: None,
        owner_pn: None,
        owner_lid: None,
    }
}

// LID-addressed group with three members.
#[tokio::test]
async fn lid_group_send_distributes_sender_key() {
    let f = fixture(RelayConfig::default());
    let group = Jid::group("123456789-987654");
    let meta = lid_group_meta(&group);

    f.transport
        .expect_iq(move |iq| {
            assert_eq!(iq.attrs.get("xmlns").unwrap(), "w:g2");
            Ok(NodeBuilder::new("iq")
                .children([build_group_metadata_node(&meta)])
                .build())
        })
        .await;
    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("100000000000001@lid", vec![0]),
                ("100000000000002@lid", vec![0]),
                ("100000000000003@lid", vec![0]),
                ("200000000000001@lid", vec![0]),
            ]))
        })
        .await;

    let member_wires: Vec<Jid> = vec![
        "100000000000001@lid".parse().unwrap(),
        "100000000000002@lid".parse().unwrap(),
        "100000000000003@lid".parse().unwrap(),
    ];
    seed_sessions(&f.signal, &member_wires).await;

    f.relay
        .relay_message(&group, text("group hello"), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    assert_eq!(stanza.attrs.get("addressing_mode").unwrap(), "lid");

    // Exactly one sender-key envelope.
    let skmsg_count = stanza
        .children()
        .unwrap()
        .iter()
        .filter(|c| {
            c.tag == "enc" && c.attrs.get("type").map(String::as_str) == Some("skmsg")
        })
        .count();
    assert_eq!(skmsg_count, 1);

    let participants = participant_jids(stanza);
    assert_eq!(participants.len(), 3);
    for wire in &member_wires {
        assert!(participants.contains(&wire.to_string()));
    }

    // After commit, sender-key-memory holds every fanned-out wire JID.
    let memory = f.relay.group_state().sender_key_memory(&group).await.unwrap();
    for wire in &member_wires {
        assert!(memory.contains(&wire.to_string()));
    }
    assert!(f
        .store
        .committed_get(NS_SENDER_KEY_MEMORY, &group.to_string())
        .await
        .is_some());
}

// A second send to the same group skips already-keyed devices.
#[tokio::test]
async fn group_resend_skips_devices_in_sender_key_memory() {
    let f = fixture(RelayConfig::default());
    let group = Jid::group("123456789-987654");

    for _ in 0..2 {
        let meta = lid_group_meta(&group);
        f.transport
            .expect_iq(move |_| {
                Ok(NodeBuilder::new("iq")
                    .children([build_group_metadata_node(&meta)])
                    .build())
            })
            .await;
        f.transport
            .expect_iq(|_| {
                Ok(usync_response(vec![
                    ("100000000000001@lid", vec![0]),
                    ("100000000000002@lid", vec![0]),
                    ("100000000000003@lid", vec![0]),
                    ("200000000000001@lid", vec![0]),
                ]))
            })
            .await;
    }

    seed_sessions(
        &f.signal,
        &[
            "100000000000001@lid".parse().unwrap(),
            "100000000000002@lid".parse().unwrap(),
            "100000000000003@lid".parse().unwrap(),
        ],
    )
    .await;

    f.relay
        .relay_message(&group, text("one"), RelayOptions::default())
        .await
        .unwrap();
    // Metadata cache is warm; invalidate to force the scripted second fetch
    // to be consumed in order (cache TTL keeps it otherwise).
    f.relay.group_state().invalidate(&group).await;
    f.relay
        .relay_message(&group, text("two"), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);
    // All devices already hold the key: no participants wrapper at all.
    assert!(stanza.get_optional_child("participants").is_none());
    let enc = stanza.get_optional_child("enc").unwrap();
    assert_eq!(enc.attrs.get("type").unwrap(), "skmsg");
}

// Retry-resend of a group message to one participant.
#[tokio::test]
async fn retry_resend_targets_single_group_participant() {
    let f = fixture(RelayConfig::default());
    let group = Jid::group("123456789-987654");
    let participant: Jid = "100000000000002@lid".parse().unwrap();
    seed_sessions(&f.signal, std::slice::from_ref(&participant)).await;

    f.relay
        .relay_message(
            &group,
            text("again"),
            RelayOptions {
                participant: Some(RetryParticipant {
                    jid: participant.clone(),
                    count: 2,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    assert_eq!(stanza.attrs.get("to").unwrap(), &group.to_string());
    assert_eq!(
        stanza.attrs.get("participant").unwrap(),
        &participant.to_string()
    );
    assert_eq!(stanza.attrs.get("device_fanout").unwrap(), "false");
    assert!(stanza.get_optional_child("participants").is_none());

    let enc = stanza.get_optional_child("enc").unwrap();
    assert_eq!(enc.attrs.get("type").unwrap(), "msg");
    assert_eq!(enc.attrs.get("count").unwrap(), "2");
    // A retry-resend never carries a sender-key envelope.
    assert!(stanza
        .children()
        .unwrap()
        .iter()
        .all(|c| c.attrs.get("type").map(String::as_str) != Some("skmsg")));
}

// Peer data operation to ourselves.
#[tokio::test]
async fn peer_data_operation_sends_inline_enc() {
    let f = fixture(RelayConfig::default());
    let me_base = Jid::pn("559990000000");
    let wire: Jid = "559990000000@s.whatsapp.net".parse().unwrap();
    seed_sessions(&f.signal, std::slice::from_ref(&wire)).await;

    f.relay
        .relay_message(&me_base, text("appdata"), RelayOptions::peer_data_operation())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    assert_eq!(stanza.attrs.get("category").unwrap(), "peer");
    assert_eq!(stanza.attrs.get("push_priority").unwrap(), "high_force");
    assert!(stanza.get_optional_child("participants").is_none());
    assert!(stanza.get_optional_child("enc").is_some());
    let meta = stanza.get_optional_child("meta").unwrap();
    assert_eq!(meta.attrs.get("appdata").unwrap(), "default");
}

// A peer send over a fresh session yields pkmsg and must therefore carry
// the device identity, like any other pairwise path.
#[tokio::test]
async fn fresh_session_peer_send_carries_device_identity() {
    let f = fixture(RelayConfig::default());
    let me_base = Jid::pn("559990000000");

    // No seeded session: asserting forces a pre-key fetch.
    f.transport
        .expect_iq(|iq| {
            assert_eq!(iq.attrs.get("xmlns").unwrap(), "encrypt");
            Ok(prekey_response(vec![
                "559990000000@s.whatsapp.net".parse().unwrap()
            ]))
        })
        .await;

    f.relay
        .relay_message(&me_base, text("appdata"), RelayOptions::peer_data_operation())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    let enc = stanza.get_optional_child("enc").unwrap();
    assert_eq!(enc.attrs.get("type").unwrap(), "pkmsg");
    assert!(stanza.get_optional_child("device-identity").is_some());
}

// Status broadcast fans out to every device of the listed users, without
// touching the group cache.
#[tokio::test]
async fn status_broadcast_uses_status_jid_list() {
    let f = fixture(RelayConfig::default());
    let status = Jid::status_broadcast();

    // Only one IQ is scripted: the usync device query. A metadata fetch
    // would fail the test with an unexpected-iq error.
    f.transport
        .expect_iq(|iq| {
            let usync = iq.get_optional_child("usync");
            assert!(usync.is_some(), "expected usync query, got {iq}");
            Ok(usync_response(vec![
                ("559980000001@s.whatsapp.net", vec![0, 1]),
                ("559980000002@s.whatsapp.net", vec![0]),
                ("559990000000@s.whatsapp.net", vec![0]),
            ]))
        })
        .await;

    let wires: Vec<Jid> = vec![
        "559980000001@s.whatsapp.net".parse().unwrap(),
        "559980000001:1@s.whatsapp.net".parse().unwrap(),
        "559980000002@s.whatsapp.net".parse().unwrap(),
    ];
    seed_sessions(&f.signal, &wires).await;

    f.relay
        .relay_message(
            &status,
            text("status update"),
            RelayOptions {
                status_jid_list: vec![Jid::pn("559980000001"), Jid::pn("559980000002")],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);

    assert_eq!(stanza.attrs.get("to").unwrap(), "status@broadcast");
    let participants = participant_jids(stanza);
    for wire in &wires {
        assert!(participants.contains(&wire.to_string()));
    }
    let skmsg = stanza
        .children()
        .unwrap()
        .iter()
        .find(|c| c.tag == "enc")
        .unwrap();
    assert_eq!(skmsg.attrs.get("type").unwrap(), "skmsg");
}

// Atomicity: a transport failure aborts the transaction; sender-key-memory
// stays clean and the error surfaces.
#[tokio::test]
async fn transport_failure_aborts_transaction() {
    let f = fixture(RelayConfig::default());
    let group = Jid::group("123456789-987654");
    let meta = lid_group_meta(&group);

    f.transport
        .expect_iq(move |_| {
            Ok(NodeBuilder::new("iq")
                .children([build_group_metadata_node(&meta)])
                .build())
        })
        .await;
    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("100000000000001@lid", vec![0]),
                ("100000000000002@lid", vec![0]),
                ("100000000000003@lid", vec![0]),
                ("200000000000001@lid", vec![0]),
            ]))
        })
        .await;
    seed_sessions(
        &f.signal,
        &[
            "100000000000001@lid".parse().unwrap(),
            "100000000000002@lid".parse().unwrap(),
            "100000000000003@lid".parse().unwrap(),
        ],
    )
    .await;

    f.transport.fail_sends(true).await;
    let err = f
        .relay
        .relay_message(&group, text("doomed"), RelayOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, warelay::RelayError::Transport(_)));

    // Nothing was committed.
    assert!(f
        .store
        .committed_get(NS_SENDER_KEY_MEMORY, &group.to_string())
        .await
        .is_none());
}

// Round-trip law: a newsletter payload decodes byte-identically.
#[tokio::test]
async fn newsletter_plaintext_round_trip() {
    let f = fixture(RelayConfig::default());
    let newsletter: Jid = "120363000000000001@newsletter".parse().unwrap();
    let message = text("newsletter body");

    let id = f
        .relay
        .relay_message(&newsletter, message.clone(), RelayOptions::default())
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);
    assert_eq!(stanza.attrs.get("id").unwrap(), &id);
    assert_eq!(stanza.attrs.get("to").unwrap(), &newsletter.to_string());

    let plaintext = stanza.get_optional_child("plaintext").unwrap();
    let decoded = wa::Message::decode(plaintext.bytes().unwrap()).unwrap();
    assert_eq!(decoded, message);
}

// Sent messages land in the recent-messages cache; retry-resends do not
// overwrite them.
#[tokio::test]
async fn retention_feeds_retry_cache() {
    let f = fixture(RelayConfig::default());
    let peer = Jid::pn("559980000001");

    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("559980000001@s.whatsapp.net", vec![0]),
                ("559990000000@s.whatsapp.net", vec![0]),
            ]))
        })
        .await;
    seed_sessions(&f.signal, &["559980000001@s.whatsapp.net".parse().unwrap()]).await;

    let id = f
        .relay
        .relay_message(&peer, text("keep me"), RelayOptions::default())
        .await
        .unwrap();

    let cached = f.relay.recent_messages().get(&peer, &id).unwrap();
    assert_eq!(cached.conversation.as_deref(), Some("keep me"));
}

// Receipts compose and ship through the same transport.
#[tokio::test]
async fn receipt_send_round_trip() {
    let f = fixture(RelayConfig::default());
    let target = ReceiptTarget {
        chat: "559980000001@s.whatsapp.net".parse().unwrap(),
        participant: None,
        ids: vec!["A1".into(), "A2".into()],
    };

    // The pure builder and the relay path agree.
    let expected = build_receipt(&target, ReceiptType::ReadSelf).unwrap();
    f.relay
        .send_receipt(&target, ReceiptType::ReadSelf)
        .await
        .unwrap();

    let sent = f.transport.sent_nodes().await;
    assert_eq!(sent.last().unwrap(), &expected);
    assert_eq!(expected.attrs.get("type").unwrap(), "read-self");
}

// V6-compat: sender-key-memory is recorded for the full distribution list
// even though nothing was sent yet, and assert failures do not abort.
#[tokio::test]
async fn v6_compat_marks_memory_upfront() {
    let config = RelayConfig {
        compat_v6_group_send: true,
        ..Default::default()
    };
    let f = fixture(config);
    let group = Jid::group("123456789-987654");
    let meta = lid_group_meta(&group);

    f.transport
        .expect_iq(move |_| {
            Ok(NodeBuilder::new("iq")
                .children([build_group_metadata_node(&meta)])
                .build())
        })
        .await;
    f.transport
        .expect_iq(|_| {
            Ok(usync_response(vec![
                ("100000000000001@lid", vec![0]),
                ("100000000000002@lid", vec![0]),
                ("100000000000003@lid", vec![0]),
                ("200000000000001@lid", vec![0]),
            ]))
        })
        .await;

    // Only two of three members have sessions; in V6-compat the pre-key
    // fetch failure for the third is swallowed and the device is dropped.
    seed_sessions(
        &f.signal,
        &[
            "100000000000001@lid".parse().unwrap(),
            "100000000000002@lid".parse().unwrap(),
        ],
    )
    .await;
    f.transport
        .expect_iq(|_| Err(TransportError::Network("prekey fetch down".into())))
        .await;

    f.relay
        .relay_message(&group, text("lenient"), RelayOptions::default())
        .await
        .unwrap();

    let memory = f.relay.group_state().sender_key_memory(&group).await.unwrap();
    // Marked up front for all three members despite the dropped device.
    assert!(memory.contains("100000000000003@lid"));

    let sent = f.transport.sent_nodes().await;
    let stanza = sent_message_stanza(&sent);
    let participants = participant_jids(stanza);
    assert_eq!(participants.len(), 2);
}
