use std::fs;
use tempfile::TempDir;

use ragctx_core::data_processor::DataProcessor;
use ragctx_core::images::{associate_images, JsonDescriptions};
use ragctx_core::types::ChunkKind;
use ragctx_core::Error;

#[test]
fn process_directory_single_file_without_delimiter() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "Short text\n").unwrap();

    let corpus = DataProcessor::new().process_directory(tmp.path()).expect("process");

    assert_eq!(corpus.documents, 1);
    assert_eq!(corpus.chunks.len(), 1, "no delimiter means one chunk");
    assert_eq!(corpus.chunks[0].text, "Short text");
    assert_eq!(corpus.chunks[0].source, "a");
}

#[test]
fn process_directory_attaches_images_and_records_missing_descriptions() {
    let tmp = TempDir::new().unwrap();
    let text_dir = tmp.path().join("text");
    let images_dir = tmp.path().join("images");
    fs::create_dir_all(&text_dir).unwrap();
    fs::create_dir_all(images_dir.join("manualA")).unwrap();
    fs::write(text_dir.join("manualA.txt"), "power up***wiring the relay").unwrap();
    fs::write(text_dir.join("manualB.txt"), "calibration").unwrap();
    fs::write(images_dir.join("manualA").join("fig1.png"), b"png").unwrap();
    fs::write(images_dir.join("manualA").join("fig2.jpg"), b"jpg").unwrap();
    fs::write(images_dir.join("manualA").join("notes.md"), b"ignored").unwrap();

    let mut descriptions = JsonDescriptions::default();
    descriptions.insert("manualA", "fig1.png", "Block diagram of the relay board");

    let corpus = DataProcessor::new()
        .with_images(&images_dir, Box::new(descriptions))
        .process_directory(&text_dir)
        .expect("process");

    assert_eq!(corpus.documents, 2);
    assert_eq!(corpus.count(ChunkKind::Text), 3);
    assert_eq!(corpus.count(ChunkKind::Image), 1);
    assert_eq!(corpus.warnings.len(), 1, "fig2.jpg has no description");
    assert!(corpus.warnings[0].contains("fig2.jpg"));

    let image = corpus.chunks.iter().find(|c| c.kind == ChunkKind::Image).unwrap();
    assert_eq!(image.id, "manualA:image:fig1.png");
    assert_eq!(image.source, "manualA");
    assert!(image.image_filename().unwrap().ends_with("fig1.png"));
    assert!(std::path::Path::new(image.image_filename().unwrap()).exists());

    // text chunks of a document precede its images
    let ids: Vec<&str> = corpus.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["manualA:0", "manualA:1", "manualA:image:fig1.png", "manualB:0"]);
}

#[test]
fn missing_image_folder_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let assoc = associate_images(tmp.path(), "nothing", &JsonDescriptions::default()).unwrap();
    assert!(assoc.chunks.is_empty());
    assert!(assoc.warnings.is_empty());
}

#[test]
fn undecodable_file_surfaces_extraction_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("bad.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();
    let err = DataProcessor::new().process_directory(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
}

#[test]
fn missing_corpus_directory_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = DataProcessor::new().process_directory(&tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
