mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{FormPart, TestApp, UnavailableVerifier};
use crowdfund_api::db::campaigns;
use crowdfund_protocol::{AdminRole, CampaignStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::task::JoinSet;

fn donation(campaign_id: &str, amount: u32) -> serde_json::Value {
    json!({
        "campaignId": campaign_id,
        "amount": amount,
        "donorName": "Asha Rao",
        "paymentMethod": "card",
    })
}

#[tokio::test]
async fn registration_requires_otp_before_login() {
    let app = TestApp::spawn().await;
    let credentials = json!({ "email": "meera@example.com", "password": "secret123" });

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "name": "Meera",
                "email": "Meera@Example.com",
                "password": "secret123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], "meera@example.com");

    let (status, _) = app
        .call(Method::POST, "/auth/login", None, Some(credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mail = app.last_mail_to("meera@example.com").expect("otp mail");
    let otp: String = mail
        .body
        .split("code is ")
        .nth(1)
        .unwrap()
        .chars()
        .take(6)
        .collect();

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/verify-otp",
            None,
            Some(json!({ "email": "meera@example.com", "otp": "000000x" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/verify-otp",
            None,
            Some(json!({ "email": "meera@example.com", "otp": otp })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].is_string());

    let (status, body) = app
        .call(Method::POST, "/auth/login", None, Some(credentials))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.call(Method::GET, "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Meera");
}

#[tokio::test]
async fn only_the_creator_may_delete_a_campaign() {
    let app = TestApp::spawn().await;
    let (creator, creator_token) = app.user("Ravi").await;
    let (_, stranger_token) = app.user("Nina").await;
    let id = app
        .campaign_in(&creator, dec!(1000), CampaignStatus::PendingReview)
        .await;
    let uri = format!("/campaigns/{id}");

    let (status, _) = app
        .call(Method::DELETE, &uri, Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.campaign_status(&id).await,
        CampaignStatus::PendingReview
    );

    let (status, _) = app
        .call(Method::DELETE, &uri, Some(&creator_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.campaign_status(&id).await, CampaignStatus::Deleted);
}

#[tokio::test]
async fn a_live_campaign_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let (creator, token) = app.user("Ravi").await;
    let id = app.active_campaign(&creator, dec!(1000)).await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/campaigns/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.campaign_status(&id).await, CampaignStatus::Active);
}

#[tokio::test]
async fn reaching_target_holds_funds_until_release() {
    let app = TestApp::spawn().await;
    let (creator, _) = app.user("Ravi").await;
    let admin = app.admin("mod@example.com", AdminRole::Admin).await;
    let id = app.active_campaign(&creator, dec!(1000)).await;
    let release = format!("/admin/campaigns/{id}/release-funds");

    let (status, _) = app.call(Method::POST, &release, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::POST, "/donations/donate", None, Some(donation(&id, 600)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["targetReached"], false);

    let (status, body) = app
        .call(Method::POST, "/donations/donate", None, Some(donation(&id, 500)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["targetReached"], true);
    assert_eq!(
        app.campaign_status(&id).await,
        CampaignStatus::AwaitingAdminApproval
    );

    let (status, _) = app
        .call(Method::POST, "/donations/donate", None, Some(donation(&id, 50)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.call(Method::POST, &release, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fundsReleased"], true);
    assert_eq!(app.campaign_status(&id).await, CampaignStatus::Completed);
}

#[tokio::test]
async fn a_donor_votes_once() {
    let app = TestApp::spawn().await;
    let (creator, _) = app.user("Ravi").await;
    let (_, voter) = app.user("Nina").await;
    let id = app.active_campaign(&creator, dec!(5000)).await;
    let uri = format!("/campaigns/{id}/vote");

    let (status, body) = app
        .call(Method::POST, &uri, Some(&voter), Some(json!({ "vote": "approve" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["voteResults"]["approveCount"], 1);

    let (status, _) = app
        .call(Method::POST, &uri, Some(&voter), Some(json!({ "vote": "reject" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn one_pending_withdrawal_per_campaign() {
    let app = TestApp::spawn().await;
    let (creator, token) = app.kyc_user("Ravi").await;
    let id = app.active_campaign(&creator, dec!(1000)).await;
    let request = json!({
        "campaignId": id,
        "amount": 250,
        "reason": "Buy roofing sheets",
    });

    let (status, _) = app
        .call(
            Method::POST,
            "/withdrawals/request",
            Some(&token),
            Some(request.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(Method::POST, "/withdrawals/request", Some(&token), Some(request))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn withdrawals_need_verified_kyc() {
    let app = TestApp::spawn().await;
    let (creator, token) = app.user("Ravi").await;
    let id = app.active_campaign(&creator, dec!(1000)).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/withdrawals/request",
            Some(&token),
            Some(json!({
                "campaignId": id,
                "amount": 250,
                "reason": "Buy roofing sheets",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::GET, "/withdrawals/my-withdrawals", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn concurrent_donations_never_lose_an_update() {
    let app = TestApp::spawn().await;
    let (creator, _) = app.user("Ravi").await;
    let id = app.active_campaign(&creator, dec!(1000)).await;

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let request = common::request(
            Method::POST,
            "/donations/donate",
            None,
            Some(donation(&id, 200)),
        );
        set.spawn(common::send(app.router.clone(), request));
    }

    let mut accepted = Decimal::ZERO;
    let mut reached = 0;
    while let Some(joined) = set.join_next().await {
        let (status, body) = joined.unwrap();
        match status {
            StatusCode::CREATED => {
                accepted += dec!(200);
                if body["data"]["targetReached"] == true {
                    reached += 1;
                }
            }
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    let campaign = campaigns::find(&app.state.pool, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(campaign.current_amount, accepted);
    assert_eq!(accepted, dec!(1000));
    assert_eq!(reached, 1);
    assert_eq!(campaign.status, CampaignStatus::AwaitingAdminApproval);
}

fn campaign_form<'a>(target: &'a str, start: &'a str, end: &'a str) -> Vec<FormPart<'a>> {
    vec![
        FormPart::Text("title", "Solar panels for the clinic"),
        FormPart::Text(
            "description",
            "Panels, batteries and wiring so the rural clinic keeps its vaccine fridge running.",
        ),
        FormPart::Text("category", "medical"),
        FormPart::Text("targetAmount", target),
        FormPart::Text("startDate", start),
        FormPart::Text("endDate", end),
        FormPart::Text("isVotingEnabled", "false"),
    ]
}

#[tokio::test]
async fn large_targets_force_voting_on() {
    let app = TestApp::spawn().await;
    let (_, token) = app.kyc_user("Ravi").await;
    let start = (Utc::now() + Duration::days(1)).to_rfc3339();
    let end = (Utc::now() + Duration::days(40)).to_rfc3339();

    let mut voting = Vec::new();
    for target in ["50000", "49999"] {
        let (status, body) = app
            .call_multipart(
                "/campaigns/create",
                &token,
                &campaign_form(target, &start, &end),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["campaignId"].as_str().unwrap().to_string();
        let campaign = campaigns::find(&app.state.pool, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::PendingReview);
        voting.push((campaign.is_voting_enabled, campaign.voting_end_date.is_some()));
    }
    assert_eq!(voting, vec![(true, true), (false, false)]);
}

#[tokio::test]
async fn campaign_creation_needs_verified_kyc() {
    let app = TestApp::spawn().await;
    let (_, token) = app.user("Ravi").await;
    let start = (Utc::now() + Duration::days(1)).to_rfc3339();
    let end = (Utc::now() + Duration::days(40)).to_rfc3339();

    let (status, _) = app
        .call_multipart(
            "/campaigns/create",
            &token,
            &campaign_form("1000", &start, &end),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(campaigns::count(&app.state.pool).await.unwrap(), 0);
}

fn identity_images() -> Vec<FormPart<'static>> {
    vec![
        FormPart::File {
            field: "idCard",
            file_name: "card.jpg",
            content_type: "image/jpeg",
            bytes: b"card-bytes",
        },
        FormPart::File {
            field: "faceImage",
            file_name: "face.png",
            content_type: "image/png",
            bytes: b"face-bytes",
        },
        FormPart::Text("idType", "AADHAR"),
    ]
}

#[tokio::test]
async fn refused_kyc_reports_reason_and_cleans_up() {
    let app = TestApp::spawn().await;
    let (_, token) = app.user("Ravi").await;

    let (status, body) = app
        .call_multipart("/kyc/verify", &token, &identity_images())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Face does not match the ID card");
    assert_eq!(app.staged_kyc_files(), 0);

    let (_, body) = app.call(Method::GET, "/kyc/status", Some(&token), None).await;
    assert_eq!(body["data"]["kycStatus"], "NOT_VERIFIED");
    let served = walk(&app.state.config.upload_dir);
    assert!(served.is_empty(), "identity images left in the served root: {served:?}");
}

#[tokio::test]
async fn unavailable_kyc_service_is_a_generic_failure() {
    let app = TestApp::spawn_with(Arc::new(UnavailableVerifier)).await;
    let (_, token) = app.user("Ravi").await;

    let (status, body) = app
        .call_multipart("/kyc/verify", &token, &identity_images())
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Identity verification failed");
    assert_eq!(app.staged_kyc_files(), 0);
}

/// Every regular file below `dir`.
fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(walk(&path));
        } else {
            files.push(path);
        }
    }
    files
}

#[tokio::test]
async fn identity_numbers_are_checked_without_exposing_owners() {
    let app = TestApp::spawn().await;
    let (owner, _) = app.kyc_user("Ravi").await;
    let (_, token) = app.user("Nina").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/kyc/check-duplicate",
            Some(&token),
            Some(json!({ "idNumber": format!("ID-{owner}"), "idType": "aadhar" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isDuplicate"], true);
    assert!(!body.to_string().contains(&owner));

    let (_, body) = app
        .call(
            Method::POST,
            "/kyc/check-duplicate",
            Some(&token),
            Some(json!({ "idNumber": "ID-unused" })),
        )
        .await;
    assert_eq!(body["data"]["isDuplicate"], false);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/kyc/status/{owner}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_review_tools() {
    let app = TestApp::spawn().await;
    let (verified, _) = app.kyc_user("Ravi").await;
    let (unverified, _) = app.user("Nina").await;
    let admin = app.admin("mod@example.com", AdminRole::Admin).await;
    let id = app.active_campaign(&verified, dec!(1000)).await;

    let (status, _) = app
        .call(Method::POST, "/donations/donate", None, Some(donation(&id, 300)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::GET, "/admin/dashboard", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let board = &body["data"];
    assert_eq!(board["users"]["total"], 2);
    assert_eq!(board["campaigns"]["active"], 1);
    assert_eq!(board["donations"]["total"], 1);
    assert_eq!(board["donations"]["amountRaised"], "300");
    assert_eq!(
        board["recentActivity"]["donations"].as_array().map(Vec::len),
        Some(1)
    );

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/admin/campaigns/{id}/documents"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["campaignId"], id.as_str());
    assert!(body["data"]["documents"].is_array());

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/admin/campaigns/{id}/notify"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification sent to campaign creator.");

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/admin/users/{verified}/kyc"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kycStatus"], "VERIFIED");

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/admin/users/{unverified}/kyc"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::GET, "/admin/users/nobody/kyc", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn platform_logo_upload_is_super_admin_only() {
    let app = TestApp::spawn().await;
    let admin = app.admin("mod@example.com", AdminRole::Admin).await;
    let root = app.admin("root@example.com", AdminRole::SuperAdmin).await;
    let logo = [FormPart::File {
        field: "logo",
        file_name: "logo.png",
        content_type: "image/png",
        bytes: b"png-bytes",
    }];

    let (status, _) = app
        .call_multipart("/platform-settings/upload-logo", &admin, &logo)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(Method::GET, "/platform-settings/admin", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call_multipart("/platform-settings/upload-logo", &root, &logo)
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["platformLogo"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/platform/logo-"));

    let (status, body) = app
        .call(Method::GET, "/platform-settings/admin", Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["platformLogo"], url.as_str());

    let not_an_image = [FormPart::File {
        field: "logo",
        file_name: "notes.pdf",
        content_type: "application/pdf",
        bytes: b"%PDF",
    }];
    let (status, _) = app
        .call_multipart("/platform-settings/upload-logo", &root, &not_an_image)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_trail_is_super_admin_only() {
    let app = TestApp::spawn().await;
    let (_, user) = app.user("Ravi").await;
    let admin = app.admin("mod@example.com", AdminRole::Admin).await;
    let root = app.admin("root@example.com", AdminRole::SuperAdmin).await;

    let (status, _) = app.call(Method::GET, "/audit-logs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/audit-logs", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::GET, "/audit-logs", Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/platform-settings/categories",
            Some(&root),
            Some(json!({ "name": "Animal welfare" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(
            Method::GET,
            "/audit-logs?action=category_create",
            Some(&root),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["logs"][0]["action"], "category_create");
}

#[tokio::test]
async fn audit_actor_filter_folds_non_ascii_case() {
    let app = TestApp::spawn().await;
    let root = app
        .admin("élodie@example.com", AdminRole::SuperAdmin)
        .await;

    let (status, _) = app
        .call(
            Method::POST,
            "/platform-settings/categories",
            Some(&root),
            Some(json!({ "name": "Animal welfare" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(
            Method::GET,
            "/audit-logs?actor=%C3%89LODIE",
            Some(&root),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}
