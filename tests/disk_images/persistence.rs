//! Editing images on disk

use a2vault_rs::prelude::{file::prodos, *};

use crate::fixtures::stamp;

#[test]
fn test_update_image_on_disk() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("edit.po");
	let options = WriteOptions::at(stamp());
	persist_image(&path, &prodos::create_volume(280, "EDIT", &options).unwrap()).unwrap();

	update_image(&path, |buffer| prodos::add_file(buffer, "/", &ProDosNewFile::new("NOTES", b"first"), &options))
		.unwrap();
	let before = read_image(&path).unwrap();

	// A duplicate name is refused and the file keeps its previous contents
	let err = update_image(&path, |buffer| {
		prodos::add_file(buffer, "/", &ProDosNewFile::new("notes", b"second"), &options)
	})
	.unwrap_err();
	assert!(matches!(err, A2FileError::DuplicateName { .. }));
	assert_eq!(err.category(), ErrorCategory::Precondition);
	assert_eq!(read_image(&path).unwrap(), before);

	let catalog = Catalog::from_bytes(&before).unwrap();
	assert_eq!(catalog.find("NOTES").and_then(CatalogEntry::data), Some(&b"first"[..]));
}

#[test]
fn test_archive_written_atomically() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("backup.shk");
	let archive = create_archive(&[NewArchiveEntry::new("A", b"alpha")], &WriteOptions::at(stamp())).unwrap();
	persist_image(&path, &archive).unwrap();

	let parsed = NuFxArchive::from_bytes(&read_image(&path).unwrap()).unwrap();
	assert_eq!(parsed.records[0].filename, "A");
	assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
