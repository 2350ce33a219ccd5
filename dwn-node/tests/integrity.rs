// SPDX-License-Identifier: MIT OR Apache-2.0

//! Envelope integrity: deterministic ids, payload binding and signatures.
use dwn_core::{Cid, MemoryDidResolver, PrivateKey, SignInput};
use dwn_node::message::AuthPayload;
use dwn_node::records::write::{CollectionsWrite, WriteOptions};
use dwn_node::test_utils::{resolver_for, Persona};
use dwn_node::{Dwn, Message};
use dwn_store::MemoryStore;

fn node_for(personas: &[&Persona]) -> Dwn<MemoryDidResolver, MemoryStore<Message>> {
    Dwn::new(resolver_for(personas), MemoryStore::new())
}

fn root(persona: &Persona) -> CollectionsWrite {
    CollectionsWrite::create_root(WriteOptions::new(
        persona.signer(),
        &persona.did,
        "test/email",
        b"{\"subject\":\"hello\"}",
    ))
    .unwrap()
}

async fn submit(
    node: &Dwn<MemoryDidResolver, MemoryStore<Message>>,
    target: &str,
    message: CollectionsWrite,
) -> dwn_node::Reply {
    node.process_message(target, Message::CollectionsWrite(message))
        .await
        .unwrap()
}

#[tokio::test]
async fn tampered_authorization_binding_is_rejected() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let mut message = root(&alice);

    // Bind a fresh recordId into the payload and re-sign with the correct
    // key: the signature is valid but no longer covers the outer envelope.
    message.authorization = AuthPayload {
        descriptor_cid: Cid::of_value(&message.descriptor).unwrap(),
        record_id: Some(Cid::of_bytes(b"a fresh unrelated record id").to_text()),
        context_id: None,
    }
    .sign(&alice.signer());

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 400);
    assert!(reply
        .status
        .detail
        .unwrap()
        .contains("does not match recordId in authorization"));
}

#[tokio::test]
async fn non_deterministic_record_id_is_rejected() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let mut message = root(&alice);

    // Consistently replace the recordId in envelope and payload; only the
    // deterministic derivation check can catch this one.
    let fresh = Cid::of_bytes(b"not derived from the descriptor").to_text();
    message.record_id = fresh.clone();
    message.authorization = AuthPayload {
        descriptor_cid: Cid::of_value(&message.descriptor).unwrap(),
        record_id: Some(fresh),
        context_id: None,
    }
    .sign(&alice.signer());

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 400);
    assert!(reply
        .status
        .detail
        .unwrap()
        .contains("does not match deterministic recordId"));
}

#[tokio::test]
async fn data_must_match_its_cid() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let mut message = root(&alice);
    // "eyJvdGhlciI6ImRhdGEifQ" is base64url for {"other":"data"}.
    message.encoded_data = Some("eyJvdGhlciI6ImRhdGEifQ".to_string());

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 400);
    assert!(reply
        .status
        .detail
        .unwrap()
        .contains("actual CID of data and dataCid in descriptor mismatch"));
}

#[tokio::test]
async fn lineage_roots_carry_matching_dates() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let mut options = WriteOptions::new(
        alice.signer(),
        &alice.did,
        "test/email",
        b"{}",
    );
    options.date_created = Some("2022-04-29T10:30:00.123456Z".to_string());
    options.date_modified = Some("2022-04-29T10:31:00.000000Z".to_string());
    let message = CollectionsWrite::create_root(options).unwrap();

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 400);
    assert!(reply.status.detail.unwrap().contains("must match dateCreated"));
}

#[tokio::test]
async fn deterministic_context_id_is_checked_for_context_roots() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let mut options = WriteOptions::new(alice.signer(), &alice.did, "email", b"{}");
    options.protocol = Some("email-protocol".to_string());
    let mut message = CollectionsWrite::create_root(options).unwrap();

    let fake_context = Cid::of_bytes(b"unrelated context").to_text();
    message.context_id = Some(fake_context.clone());
    message.authorization = AuthPayload {
        descriptor_cid: Cid::of_value(&message.descriptor).unwrap(),
        record_id: Some(message.record_id.clone()),
        context_id: Some(fake_context),
    }
    .sign(&alice.signer());

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 400);
    assert!(reply
        .status
        .detail
        .unwrap()
        .contains("does not match deterministic contextId"));
}

#[tokio::test]
async fn signatures_from_the_wrong_key_are_rejected() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    // Signed with a key which is not the one advertised under Alice's kid.
    let mallory_key = PrivateKey::new();
    let message = CollectionsWrite::create_root(WriteOptions::new(
        SignInput {
            kid: alice.kid.clone(),
            private_key: &mallory_key,
        },
        &alice.did,
        "test/email",
        b"{}",
    ))
    .unwrap();

    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 401);
}

#[tokio::test]
async fn unresolvable_authors_are_rejected() {
    let alice = Persona::new("alice");
    let ghost = Persona::new("ghost");

    // Only Alice is registered with the resolver.
    let node = node_for(&[&alice]);

    let message = root(&ghost);
    let reply = submit(&node, &alice.did, message).await;
    assert_eq!(reply.status.code, 401);
}

#[tokio::test]
async fn malformed_envelopes_are_rejected() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let reply = node
        .process_json(
            &alice.did,
            serde_json::json!({ "descriptor": { "method": "CollectionsErase" } }),
        )
        .await
        .unwrap();
    assert_eq!(reply.status.code, 400);

    let reply = node
        .process_json(&alice.did, serde_json::json!({ "hello": "world" }))
        .await
        .unwrap();
    assert_eq!(reply.status.code, 400);

    // A well-formed write with an unknown descriptor field.
    let message = root(&alice);
    let mut raw = serde_json::to_value(Message::CollectionsWrite(message)).unwrap();
    raw["descriptor"]["surprise"] = serde_json::json!(true);
    let reply = node.process_json(&alice.did, raw).await.unwrap();
    assert_eq!(reply.status.code, 400);
}

#[tokio::test]
async fn wire_format_roundtrips_through_json() {
    let alice = Persona::new("alice");
    let node = node_for(&[&alice]);

    let message = root(&alice);
    let raw = serde_json::to_value(Message::CollectionsWrite(message.clone())).unwrap();

    // The envelope carries the descriptor, authorization and encoded data.
    assert!(raw.get("recordId").is_some());
    assert!(raw["descriptor"].get("dataCid").is_some());
    assert!(raw["authorization"].get("payload").is_some());
    assert!(raw.get("encodedData").is_some());

    let reply = node.process_json(&alice.did, raw).await.unwrap();
    assert_eq!(reply.status.code, 202);
}
