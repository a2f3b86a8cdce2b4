//! End-to-end pipeline tests over a realistic fixture hierarchy.

use std::sync::Arc;

use lotus::models::{AdminName, AdminRow};
use lotus::store::AbbrevEntry;
use lotus::text;
use lotus::{AddressMatcher, Hints, MatchType, MatcherConfig, QualityFlag, ReferenceStore};

fn row(province: (&str, &str), district: (&str, &str), ward: (&str, &str)) -> AdminRow {
    AdminRow::new(
        AdminName::new(province.0, province.1),
        AdminName::new(district.0, district.1),
        AdminName::new(ward.0, ward.1),
    )
}

fn fixture_store() -> ReferenceStore {
    let hn = ("Thành phố", "Hà Nội");
    let hcm = ("Thành phố", "Hồ Chí Minh");
    let rows = vec![
        row(hn, ("Quận", "Ba Đình"), ("Phường", "Điện Biên")),
        row(hn, ("Quận", "Ba Đình"), ("Phường", "Kim Mã")),
        row(hn, ("Quận", "Cầu Giấy"), ("Phường", "Trung Hòa")),
        row(hn, ("Quận", "Cầu Giấy"), ("Phường", "Yên Hòa")),
        row(hn, ("Quận", "Bắc Từ Liêm"), ("Phường", "Cổ Nhuế 1")),
        row(hn, ("Quận", "Bắc Từ Liêm"), ("Phường", "Cổ Nhuế 2")),
        row(hn, ("Quận", "Hoàng Mai"), ("Phường", "Giáp Bát")),
        // A same-named ward in a different province; the hierarchy chaining
        // rule must keep it out of Hà Nội results.
        row(("Tỉnh", "Tuyên Quang"), ("Huyện", "Sơn Dương"), ("Xã", "Trung Yên")),
        row(hcm, ("Quận", "8"), ("Phường", "4")),
        row(hcm, ("Quận", "8"), ("Phường", "5")),
        row(hcm, ("Quận", "8"), ("Phường", "Rạch Ông")),
        row(hcm, ("Quận", "1"), ("Phường", "Bến Nghé")),
        row(hcm, ("Quận", "1"), ("Phường", "Bến Thành")),
        row(hcm, ("Quận", "Tân Bình"), ("Phường", "2")),
    ];
    let abbrevs = vec![
        AbbrevEntry {
            key: "hn".into(),
            word: "ha noi".into(),
            province_context: None,
            district_context: None,
        },
        AbbrevEntry {
            key: "hcm".into(),
            word: "ho chi minh".into(),
            province_context: None,
            district_context: None,
        },
    ];
    ReferenceStore::from_parts(rows, abbrevs, Vec::new())
}

fn matcher() -> AddressMatcher {
    AddressMatcher::new(Arc::new(fixture_store()), MatcherConfig::default())
}

#[test]
fn resolves_fully_abbreviated_hanoi_address() {
    let result = matcher().resolve("P. Điện Biên, Q. Ba Đình, HN", &Hints::none());
    assert_eq!(result.province.as_deref(), Some("Hà Nội"));
    assert_eq!(result.district.as_deref(), Some("Ba Đình"));
    assert_eq!(result.ward.as_deref(), Some("Điện Biên"));
    assert_eq!(result.match_type, MatchType::Exact);
    assert!(result.confidence >= 0.9, "confidence {}", result.confidence);
    assert_eq!(result.quality_flag, QualityFlag::FullAddress);
    assert!(result.remaining_text.is_empty());
}

#[test]
fn resolves_glued_numeric_ward_and_district() {
    let result = matcher().resolve(
        "660/8 PHAM THE HIEN P4 Q8",
        &Hints::province("Ho Chi Minh"),
    );
    assert_eq!(result.province.as_deref(), Some("Hồ Chí Minh"));
    assert_eq!(result.district.as_deref(), Some("Quận 8"));
    assert_eq!(result.ward.as_deref(), Some("Phường 4"));
    assert!(result.confidence >= 0.85, "confidence {}", result.confidence);
    assert_eq!(result.quality_flag, QualityFlag::FullAddress);
    // The street number and name survive as the residual.
    assert_eq!(result.remaining_text, "660/8 PHAM THE HIEN");
}

#[test]
fn street_only_address_resolves_province_only() {
    let result = matcher().resolve("22 NGO 629 GIAI PHONG HA NOI", &Hints::none());
    assert_eq!(result.province.as_deref(), Some("Hà Nội"));
    assert!(result.district.is_none());
    assert!(result.ward.is_none());
    assert_eq!(result.quality_flag, QualityFlag::ProvinceOnly);
    assert!(
        (0.6..=0.85).contains(&result.confidence),
        "confidence {}",
        result.confidence
    );
    assert!(result.remaining_text.contains("GIAI PHONG"));
}

#[test]
fn hierarchy_chaining_rejects_same_named_ward_elsewhere() {
    let result = matcher().resolve(
        "14 LO 3A TRUNG YEN 6 KDT TRUNG YEN PHUONG TRUNG HOA CAU GIAY",
        &Hints::province("Hà Nội"),
    );
    assert_eq!(result.district.as_deref(), Some("Cầu Giấy"));
    assert_eq!(result.ward.as_deref(), Some("Trung Hòa"));
    assert_eq!(result.province.as_deref(), Some("Hà Nội"));
    assert_eq!(result.quality_flag, QualityFlag::FullAddress);
}

#[test]
fn letter_digit_spacing_rescues_glued_ward_name() {
    let result = matcher().resolve("co nhue1", &Hints::none());
    assert_eq!(result.ward.as_deref(), Some("Cổ Nhuế 1"));
}

#[test]
fn named_ward_preferred_over_penalized_street_number() {
    let result = matcher().resolve("8 Nguyen Hue Ben Nghe Quan 1 TP HCM", &Hints::none());
    assert_eq!(result.province.as_deref(), Some("Hồ Chí Minh"));
    assert_eq!(result.district.as_deref(), Some("Quận 1"));
    assert_eq!(result.ward.as_deref(), Some("Bến Nghé"));
}

#[test]
fn round_trip_of_canonical_names_is_exact_with_empty_residual() {
    let matcher = matcher();
    for row in matcher.store().load_all_rows() {
        let input = format!(
            "{}, {}, {}",
            row.province.full, row.district.full, row.ward.full
        );
        let result = matcher.resolve(&input, &Hints::none());
        assert_eq!(result.match_type, MatchType::Exact, "input {input}");
        assert_eq!(
            text::normalize_admin_name(result.province.as_deref().unwrap()),
            text::normalize_admin_name(&row.province.name),
            "input {input}"
        );
        assert!(result.remaining_text.is_empty(), "residual for {input}");
    }
}

#[test]
fn resolved_wards_always_form_valid_triples() {
    let matcher = matcher();
    let inputs = [
        "P. Điện Biên, Q. Ba Đình, HN",
        "660/8 PHAM THE HIEN P4 Q8",
        "co nhue1",
        "8 Nguyen Hue Ben Nghe Quan 1 TP HCM",
        "phuong trung hoa cau giay ha noi",
    ];
    for input in inputs {
        let result = matcher.resolve(input, &Hints::none());
        if result.ward.is_some() {
            let normalize = |v: &Option<String>| v.as_deref().map(text::normalize_admin_name);
            assert!(
                matcher.store().validate_triple(
                    normalize(&result.province).as_deref(),
                    normalize(&result.district).as_deref(),
                    normalize(&result.ward).as_deref(),
                ),
                "invalid triple for {input}"
            );
        }
    }
}

#[test]
fn resolving_a_result_again_is_stable() {
    let matcher = matcher();
    let first = matcher.resolve("P. Điện Biên, Q. Ba Đình, HN", &Hints::none());
    let names = format!(
        "{}, {}, {}",
        first.ward.as_deref().unwrap(),
        first.district.as_deref().unwrap(),
        first.province.as_deref().unwrap()
    );
    let second = matcher.resolve(&names, &Hints::none());
    assert_eq!(second.province, first.province);
    assert_eq!(second.district, first.district);
    assert_eq!(second.ward, first.ward);
}

#[test]
fn unmatched_input_reports_failed_with_full_residual() {
    let result = matcher().resolve("tong dai vien thong 18001091", &Hints::none());
    assert_eq!(result.quality_flag, QualityFlag::Failed);
    assert_eq!(result.remaining_text, "tong dai vien thong 18001091");
}

#[test]
fn wrong_province_hint_is_not_corrected() {
    // The ward exists only in Hà Nội; a Hồ Chí Minh hint scopes it away.
    let result = matcher().resolve("phuong dien bien", &Hints::province("Hồ Chí Minh"));
    assert!(result.ward.is_none());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn matcher() -> AddressMatcher {
        super::matcher()
    }

    proptest! {
        #[test]
        fn preprocess_is_idempotent(raw in "[a-zA-Z0-9,./\\- ]{0,48}") {
            let matcher = matcher();
            let first = matcher.resolve(&raw, &Hints::none());
            let _ = first; // resolve must never panic on arbitrary input

            let store = fixture_store();
            let once =
                lotus::pipeline::preprocess::preprocess(&raw, None, None, &store).normalized();
            let twice =
                lotus::pipeline::preprocess::preprocess(&once, None, None, &store).normalized();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn residual_is_never_longer_than_the_input(raw in "[a-zA-Z0-9,./\\- ]{0,48}") {
            let result = matcher().resolve(&raw, &Hints::none());
            prop_assert!(result.remaining_text.len() <= raw.trim().len().max(raw.len()));
        }
    }
}
