//! Generate JSON test vectors for the web UI's TypeScript tests.
//!
//! Run with: cargo run --package protocol --example test_vectors

use protocol::messages::*;
use protocol::Credentials;
use serde::Serialize;

fn main() {
    // Test vector 1: Directory listing
    let listing = vec![
        FileEntry::directory("reports", "docs/reports"),
        FileEntry::file("notes.txt", "docs/notes.txt", 100),
    ];
    print_test_vector("listing", &listing);

    // Test vector 2: Partially successful upload
    let upload = UploadResponse::from_results(vec![
        UploadResult {
            file_name: "notes.txt".to_string(),
            saved_name: Some("notes_1704067200.txt".to_string()),
            error: None,
        },
        UploadResult {
            file_name: "setup.exe".to_string(),
            saved_name: None,
            error: Some(ErrorMessage::new(
                ErrorCode::InvalidRequest,
                "file type not allowed: .exe",
            )),
        },
    ]);
    print_test_vector("upload_partial", &upload);

    // Test vector 3: Allow-list
    let allowed = AllowedTypes {
        allowed_extensions: vec![".pdf".to_string(), ".txt".to_string()],
        allow_all: false,
    };
    print_test_vector("allowed_types", &allowed);

    // Test vector 4: Error message
    let error = ErrorMessage::new(ErrorCode::AccessDenied, "access denied: ../etc");
    print_test_vector("error", &error);

    // Test vector 5: Authorization header
    let header = Credentials::new("admin", "secret").to_authorization_header();
    println!("export const authorization_header = {:?};", header);
}

fn print_test_vector<T: Serialize>(name: &str, value: &T) {
    match to_json(value) {
        Ok(bytes) => println!(
            "export const {} = {};",
            name,
            String::from_utf8_lossy(&bytes)
        ),
        Err(e) => eprintln!("failed to serialize {}: {}", name, e),
    }
}
