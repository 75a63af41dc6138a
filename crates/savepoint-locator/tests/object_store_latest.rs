use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use savepoint_locator::fs::OsFilesystem;
use savepoint_locator::location::{Backend, classify};
use savepoint_locator::s3::{ListError, ObjectEntry, ObjectStore, StoreLoader};
use savepoint_locator::{Error, ErrorKind, ListFailure, Result, SavepointLocator};

type Calls = Rc<RefCell<Vec<(String, Option<String>)>>>;

#[derive(Clone)]
struct FakeStore {
    listing: std::result::Result<Vec<ObjectEntry>, ListError>,
    calls: Calls,
}

impl ObjectStore for FakeStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> std::result::Result<Vec<ObjectEntry>, ListError> {
        self.calls
            .borrow_mut()
            .push((bucket.to_string(), prefix.map(ToOwned::to_owned)));
        self.listing.clone()
    }
}

struct FakeLoader {
    store: Option<FakeStore>,
}

impl StoreLoader for FakeLoader {
    type Store = FakeStore;

    fn load(&self) -> Result<FakeStore> {
        self.store
            .clone()
            .ok_or_else(|| Error::config("unable to load SDK config: no credentials"))
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn locator_with(
    listing: std::result::Result<Vec<ObjectEntry>, ListError>,
) -> (SavepointLocator<FakeLoader, OsFilesystem>, Calls) {
    let calls = Calls::default();
    let store = FakeStore {
        listing,
        calls: calls.clone(),
    };
    (
        SavepointLocator::new(FakeLoader { store: Some(store) }, OsFilesystem),
        calls,
    )
}

#[test]
fn newest_metadata_object_wins() {
    let (locator, calls) = locator_with(Ok(vec![
        ObjectEntry::new("checkpoints/sp-1/_metadata", at(100)),
        ObjectEntry::new("checkpoints/sp-3/_metadata", at(300)),
        ObjectEntry::new("checkpoints/sp-3/part-0000", at(999)),
        ObjectEntry::new("checkpoints/sp-2/_metadata", at(200)),
    ]));

    let got = locator.latest("s3://my-bucket/checkpoints/").expect("latest");
    assert_eq!(got, "s3://my-bucket/checkpoints/sp-3/_metadata");
    assert_eq!(
        calls.borrow().as_slice(),
        &[("my-bucket".to_string(), Some("checkpoints/".to_string()))]
    );
}

#[test]
fn ties_keep_first_listed() {
    let (locator, _) = locator_with(Ok(vec![
        ObjectEntry::new("a/_metadata", at(10)),
        ObjectEntry::new("b/_metadata", at(50)),
        ObjectEntry::new("c/_metadata", at(50)),
    ]));
    assert_eq!(locator.latest("s3://bkt").expect("latest"), "s3://bkt/b/_metadata");
}

#[test]
fn no_candidates_is_empty_and_ok() {
    let (locator, _) = locator_with(Ok(vec![ObjectEntry::new("a/part-0", at(10))]));
    assert_eq!(locator.latest("s3://bkt/a").expect("no candidates"), "");

    let (locator, _) = locator_with(Ok(Vec::new()));
    assert_eq!(locator.latest("s3://bkt/a").expect("empty listing"), "");
}

#[test]
fn scheme_and_bucket_round_trip() {
    for scheme in ["s3", "s3a", "s3p"] {
        let (locator, _) = locator_with(Ok(vec![ObjectEntry::new("x/_metadata", at(1))]));
        let input = format!("{scheme}://Bucket-1/x/");
        let got = locator.latest(&input).expect("latest");

        let (Backend::ObjectStore(src), Backend::ObjectStore(out)) =
            (classify(&input), classify(&got))
        else {
            panic!("both locations must be object store locations");
        };
        assert_eq!(out.scheme, src.scheme);
        assert_eq!(out.bucket, src.bucket);
        assert_eq!(out.path, "/x/_metadata");
    }
}

#[test]
fn bucket_only_location_lists_without_prefix() {
    let (locator, calls) = locator_with(Ok(Vec::new()));
    locator.latest("s3p://bucket").expect("latest");
    assert_eq!(calls.borrow().as_slice(), &[("bucket".to_string(), None)]);
}

#[test]
fn listing_failure_is_classified_and_wrapped() {
    let (locator, _) = locator_with(Err(ListError::new(
        ListFailure::NoSuchBucket,
        "The specified bucket does not exist",
    )));
    let err = locator.latest("s3://nope/sp").expect_err("no bucket");
    assert_eq!(err.kind(), &ErrorKind::Listing(ListFailure::NoSuchBucket));
    assert_eq!(
        err.to_string(),
        "listing S3 objects: The specified bucket does not exist"
    );

    let (locator, calls) = locator_with(Err(ListError::new(ListFailure::Request, "AccessDenied")));
    let err = locator.latest("s3://b/sp").expect_err("denied");
    assert_eq!(err.list_failure(), Some(ListFailure::Request));
    assert_eq!(calls.borrow().len(), 1, "listing must not be retried");
}

#[test]
fn config_failure_surfaces_before_listing() {
    let locator = SavepointLocator::new(FakeLoader { store: None }, OsFilesystem);
    let err = locator.latest("s3://b/sp").expect_err("config");
    assert_eq!(err.kind(), &ErrorKind::Config);
    assert!(err.to_string().contains("unable to load SDK config"), "{err}");
}

#[test]
fn missing_bucket_is_rejected() {
    let (locator, calls) = locator_with(Ok(Vec::new()));
    let err = locator.latest("s3:sp/").expect_err("no bucket");
    assert_eq!(err.kind(), &ErrorKind::InvalidLocation);
    assert!(calls.borrow().is_empty());
}

#[test]
fn other_schemes_never_touch_the_store() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (locator, calls) = locator_with(Ok(Vec::new()));
    let err = locator
        .latest(&format!("{}/", tmp.path().display()))
        .expect_err("empty local dir");
    assert!(matches!(err.kind(), ErrorKind::EmptyDirectory { .. }));
    assert!(calls.borrow().is_empty());
}

#[test]
fn keys_with_percent_point_back_at_the_same_key() {
    let (locator, _) = locator_with(Ok(vec![ObjectEntry::new("sp%20x/_metadata", at(7))]));
    let got = locator.latest("s3://b/").expect("latest");
    assert_eq!(got, "s3://b/sp%2520x/_metadata");

    let Backend::ObjectStore(out) = classify(&got) else {
        panic!("result must be an object store location");
    };
    assert_eq!(out.prefix(), Some("sp%20x/_metadata"));
}
