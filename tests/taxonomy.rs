use kira_segqc::modality::Modality;
use kira_segqc::taxonomy::{ClassTaxonomy, RegionGroup, parse_label_tsv};

#[test]
fn builtin_has_120_and_36_classes() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    assert_eq!(taxonomy.size(Modality::PetCt), 120);
    assert_eq!(taxonomy.size(Modality::CtOnly), 36);
    assert_eq!(taxonomy.ids(Modality::PetCt), (1..=120).collect::<Vec<u8>>());
}

#[test]
fn ct_only_is_the_body_subset_with_same_names() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let full = taxonomy.ids(Modality::PetCt);
    for id in taxonomy.ids(Modality::CtOnly) {
        assert!(full.contains(&id));
        let def = taxonomy.get(id).unwrap();
        assert_eq!(def.group, RegionGroup::Body);
        assert!(taxonomy.contains(Modality::PetCt, id));
    }
    let cerebral = taxonomy
        .labels()
        .filter(|d| d.group == RegionGroup::Cerebral)
        .count();
    assert_eq!(cerebral, 84);
    assert!(!taxonomy.contains(Modality::CtOnly, 37));
    assert!(taxonomy.contains(Modality::PetCt, 37));
}

#[test]
fn liver_keeps_its_id() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    assert_eq!(taxonomy.name(7), Some("liver"));
    assert!(!taxonomy.contains(Modality::PetCt, 0));
    assert!(!taxonomy.contains(Modality::PetCt, 121));
}

#[test]
fn label_tsv_rejects_duplicates_and_bad_groups() {
    let dup = "1\tliver\tbody\n1\tspleen\tbody\n";
    let err = parse_label_tsv(dup, "dup.tsv").unwrap_err();
    assert!(err.to_string().contains("dup.tsv:2"));

    let bad_group = "1\tliver\torgan\n";
    assert!(parse_label_tsv(bad_group, "bad.tsv").is_err());

    let zero = "0\tbackground\tbody\n";
    assert!(parse_label_tsv(zero, "zero.tsv").is_err());

    let ok = "# comment\n\n1\tliver\tbody\n2\tbrain_x_left\tcerebral\n";
    assert_eq!(parse_label_tsv(ok, "ok.tsv").unwrap().len(), 2);
}
