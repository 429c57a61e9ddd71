use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::domain::{MessageId, MessageKind, RoomId};

use super::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
}

fn at(sender: &str, kind: MessageKind, offset_secs: i64) -> ChatMessage {
    ChatMessage {
        room_id: RoomId::from("r"),
        message_id: Some(MessageId(offset_secs)),
        sender: MemberId::from(sender),
        content: format!("{sender}@{offset_secs}"),
        kind,
        send_time: base_time() + Duration::seconds(offset_secs),
        file_url: None,
    }
}

fn fallback() -> FallbackIdentity {
    FallbackIdentity {
        name: "Guest".into(),
        rank: "".into(),
        avatar_url: "/defaultprofile.png".into(),
    }
}

fn roster() -> ParticipantRoster {
    ParticipantRoster::new(vec![
        Participant {
            member_id: MemberId::from("kim"),
            name: "Kim".into(),
            rank_name: "Manager".into(),
            profile_image_url: "https://cdn/kim.png".into(),
        },
        Participant {
            member_id: MemberId::from("me"),
            name: "Me".into(),
            rank_name: "".into(),
            profile_image_url: "/defaultprofile.png".into(),
        },
    ])
}

fn hidden(sequence: &[ChatMessage]) -> Vec<bool> {
    GroupingPresenter::default()
        .decorate(sequence, &MemberId::from("me"), &roster(), &fallback())
        .into_iter()
        .map(|row| row.hide_profile)
        .collect()
}

#[test]
fn groups_same_remote_sender_within_a_minute() {
    let sequence = [
        at("kim", MessageKind::Talk, 0),
        at("kim", MessageKind::Talk, 30),
    ];
    assert_eq!(hidden(&sequence), vec![false, true]);
}

#[test]
fn splits_same_sender_after_window() {
    let sequence = [
        at("kim", MessageKind::Talk, 0),
        at("kim", MessageKind::Talk, 90),
    ];
    assert_eq!(hidden(&sequence), vec![false, false]);
}

#[test]
fn window_boundary_is_inclusive_and_order_insensitive() {
    let sequence = [
        at("kim", MessageKind::Talk, 60),
        at("kim", MessageKind::Talk, 0),
    ];
    assert_eq!(hidden(&sequence), vec![false, true]);
}

#[test]
fn local_sender_never_anchors_a_group() {
    let sequence = [
        at("me", MessageKind::Talk, 0),
        at("me", MessageKind::Talk, 5),
    ];
    assert_eq!(hidden(&sequence), vec![false, false]);
}

#[test]
fn system_rows_are_never_hidden_and_break_the_chain() {
    let sequence = [
        at("kim", MessageKind::Talk, 0),
        at("kim", MessageKind::System, 10),
        at("kim", MessageKind::Talk, 20),
        at("kim", MessageKind::Talk, 25),
    ];
    assert_eq!(hidden(&sequence), vec![false, false, false, true]);

    let rows = GroupingPresenter::default().decorate(
        &sequence,
        &MemberId::from("me"),
        &roster(),
        &fallback(),
    );
    assert!(rows[1].is_banner);
    assert!(!rows[0].is_banner);
}

#[test]
fn custom_window_applies() {
    let sequence = [
        at("kim", MessageKind::Talk, 0),
        at("kim", MessageKind::Talk, 30),
    ];
    let rows = GroupingPresenter::new(10_000).decorate(
        &sequence,
        &MemberId::from("me"),
        &roster(),
        &fallback(),
    );
    assert!(!rows[1].hide_profile);
}

#[test]
fn resolves_sender_identity_with_fallback() {
    let sequence = [
        at("kim", MessageKind::Talk, 0),
        at("stranger", MessageKind::Talk, 1),
        at("me", MessageKind::Talk, 2),
    ];
    let rows = GroupingPresenter::default().decorate(
        &sequence,
        &MemberId::from("me"),
        &roster(),
        &fallback(),
    );

    assert_eq!(rows[0].sender_label, "Kim Manager");
    assert_eq!(rows[0].avatar_url, "https://cdn/kim.png");
    assert_eq!(rows[1].sender_label, "Guest");
    assert_eq!(rows[1].avatar_url, "/defaultprofile.png");
    assert_eq!(rows[2].sender_label, "Me");
    assert!(rows[2].is_mine);
    assert!(!rows[0].is_mine);
}

#[test]
fn roster_from_directory_builds_avatar_urls() {
    let records = vec![
        MemberRecord {
            member_id: MemberId::from("kim"),
            name: "Kim".into(),
            rank_name: Some("Manager".into()),
        },
        MemberRecord {
            member_id: MemberId::from("lee"),
            name: "Lee".into(),
            rank_name: None,
        },
        MemberRecord {
            member_id: MemberId::from("park"),
            name: "Park".into(),
            rank_name: None,
        },
    ];
    let profiles = vec![
        Some(MemberProfileRecord {
            display_name: None,
            avatar_ref: Some("kim.png".into()),
        }),
        Some(MemberProfileRecord::default()),
        None,
    ];

    let roster = ParticipantRoster::from_directory(
        records,
        profiles,
        "https://storage.example/bucket/",
        "/defaultprofile.png",
    );

    let urls: Vec<&str> = roster
        .members()
        .iter()
        .map(|p| p.profile_image_url.as_str())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://storage.example/bucket/kim.png",
            "/defaultprofile.png",
            "/defaultprofile.png"
        ]
    );
    assert_eq!(roster.members()[1].label(), "Lee");
}

#[test]
fn blank_directory_name_uses_profile_name() {
    let records = vec![
        MemberRecord {
            member_id: MemberId::from("choi"),
            name: "  ".into(),
            rank_name: Some("Lead".into()),
        },
        MemberRecord {
            member_id: MemberId::from("kim"),
            name: "Kim".into(),
            rank_name: None,
        },
    ];
    let profiles = vec![
        Some(MemberProfileRecord {
            display_name: Some("Choi".into()),
            avatar_ref: None,
        }),
        Some(MemberProfileRecord {
            display_name: Some("Kimberly".into()),
            avatar_ref: None,
        }),
    ];

    let roster = ParticipantRoster::from_directory(records, profiles, "", "/defaultprofile.png");

    let labels: Vec<String> = roster.members().iter().map(Participant::label).collect();
    assert_eq!(labels, vec!["Choi Lead", "Kim"]);
}

#[test]
fn conversation_title_excludes_local_user_and_dedupes() {
    let mut members = roster().members().to_vec();
    members.push(Participant {
        member_id: MemberId::from("kim-2"),
        name: "Kim".into(),
        rank_name: "Manager".into(),
        profile_image_url: String::new(),
    });
    members.push(Participant {
        member_id: MemberId::from("lee"),
        name: "Lee".into(),
        rank_name: String::new(),
        profile_image_url: String::new(),
    });
    let roster = ParticipantRoster::new(members);

    assert_eq!(
        roster.conversation_title(&MemberId::from("me"), &fallback()),
        "Kim Manager, Lee"
    );
    assert_eq!(
        ParticipantRoster::default().conversation_title(&MemberId::from("me"), &fallback()),
        "Guest"
    );
}
