use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use mathstarz_client::{ClientConfig, HttpBackend, RemoteBackend, SyncError};
use mathstarz_game::{PuzzleKey, PuzzleProgress, UserId, UserRecord};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type Posted = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

async fn route(req: Request<Body>, posted: Posted) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let method = req.method().clone();
    let reply = |status: StatusCode, body: &str| {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = match (method, path.as_str()) {
        (Method::GET, "/puzzles/user") if query == "userId=7" => reply(
            StatusCode::OK,
            r#"[{"puzzleId": 1, "userId": 7, "piecesCollected": 3},
                {"puzzleId": 2, "userId": 7, "piecesCollected": 0}]"#,
        ),
        (Method::GET, "/puzzles/user") if query == "userId=9" => reply(
            StatusCode::OK,
            r#"[{"puzzleId": 1, "userId": 9, "piecesCollected": -2},
                {"puzzleId": 2, "userId": 9, "piecesCollected": null},
                {"puzzleId": 3, "userId": 9, "piecesCollected": 2}]"#,
        ),
        (Method::GET, "/puzzles/user") => reply(StatusCode::OK, "not json"),
        (Method::POST, "/puzzles/update" | "/users/update") => {
            let bytes = hyper::body::to_bytes(req.into_body()).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap();
            posted.lock().unwrap().push((path.clone(), body));
            reply(StatusCode::OK, "{}")
        }
        (Method::GET, "/questions/5") => reply(
            StatusCode::OK,
            r#"{"shape": "square", "question_text": "2+2", "question_type": "multiple_choice",
                "options": ["3", "4"], "correct_option_index": 1, "answer": "4", "points": 15}"#,
        ),
        (Method::GET, "/users") if query == "id=7" => reply(
            StatusCode::OK,
            r#"{"_id": "65ab", "id": "7", "firstName": "Noa", "totalPoints": 40,
                "shapes": {"triangle": 40}}"#,
        ),
        _ => reply(StatusCode::NOT_FOUND, r#"{"error": "not found"}"#),
    };
    Ok(response)
}

fn spawn_server() -> (SocketAddr, Posted) {
    let posted: Posted = Arc::default();
    let shared = Arc::clone(&posted);
    let make_svc = make_service_fn(move |_conn| {
        let posted = Arc::clone(&shared);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| route(req, Arc::clone(&posted))))
        }
    });
    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, posted)
}

fn backend(addr: SocketAddr) -> HttpBackend {
    let config = ClientConfig {
        backend_url: format!("http://{addr}/"),
        ..ClientConfig::default()
    };
    HttpBackend::new(&config).unwrap()
}

#[tokio::test]
async fn pulls_puzzle_list_for_user() {
    let (addr, _) = spawn_server();
    let records = backend(addr).pull_all_puzzles(UserId(7)).await.unwrap();
    assert_eq!(
        records,
        vec![
            PuzzleProgress::from_key(PuzzleKey::new(UserId(7), 1), 3),
            PuzzleProgress::from_key(PuzzleKey::new(UserId(7), 2), 0),
        ]
    );
}

#[tokio::test]
async fn pull_skips_bad_records_and_clamps_negative_counts() {
    let (addr, _) = spawn_server();
    let records = backend(addr).pull_all_puzzles(UserId(9)).await.unwrap();
    assert_eq!(
        records,
        vec![
            PuzzleProgress::from_key(PuzzleKey::new(UserId(9), 1), 0),
            PuzzleProgress::from_key(PuzzleKey::new(UserId(9), 3), 2),
        ]
    );
}

#[tokio::test]
async fn malformed_pull_keeps_raw_body() {
    let (addr, _) = spawn_server();
    let err = backend(addr).pull_all_puzzles(UserId(8)).await.unwrap_err();
    match err {
        SyncError::Decode { endpoint, raw, .. } => {
            assert_eq!(endpoint, "/puzzles/user");
            assert_eq!(raw, "not json");
        }
        other => panic!("expected decode error, got {other}"),
    }
}

#[tokio::test]
async fn pushes_post_json_bodies() {
    let (addr, posted) = spawn_server();
    let backend = backend(addr);
    let progress = PuzzleProgress::from_key(PuzzleKey::new(UserId(7), 3), 4);
    backend.push_puzzle_delta(&progress).await.unwrap();
    let mut user = UserRecord::new(UserId(7), "Noa");
    user.award(10, "triangle");
    backend.push_score_update(&user).await.unwrap();

    let posted = posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 2);
    assert_eq!(posted[0].0, "/puzzles/update");
    assert_eq!(
        posted[0].1,
        serde_json::json!({"puzzleId": 3, "userId": 7, "piecesCollected": 4})
    );
    assert_eq!(posted[1].0, "/users/update");
    assert_eq!(posted[1].1["totalPoints"], 10);
}

#[tokio::test]
async fn fetches_question_by_id() {
    let (addr, _) = spawn_server();
    let question = backend(addr).fetch_question("5").await.unwrap();
    assert_eq!(question.points, 15);
    assert_eq!(question.options, vec!["3", "4"]);
    assert!(question.verdict("4").correct);
}

#[tokio::test]
async fn unknown_question_is_a_status_error() {
    let (addr, _) = spawn_server();
    let err = backend(addr).fetch_question("99").await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 404, .. }));
}

#[tokio::test]
async fn fetches_user_record() {
    let (addr, _) = spawn_server();
    let user = backend(addr).fetch_user(UserId(7)).await.unwrap();
    assert_eq!(user.document_id, "65ab");
    assert_eq!(user.user_id().unwrap(), UserId(7));
    assert_eq!(user.total_points, 40);
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = backend(addr).pull_all_puzzles(UserId(7)).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}
