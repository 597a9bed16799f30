//! End-to-end pipeline tests: kfilter sweep feeding the annotation pass,
//! with gene and conservation lookups over temp-file fixtures.

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use karst_genomics::counts::KmerCount;
use karst_genomics::engine::VecSource;
use karst_genomics::pipeline::{AnnotateCommand, ConservCommand, KfilterCommand};
use karst_genomics::rules::GcProfile;

/// Helper to create a temporary input file.
fn create_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

fn kc(kmer: &str, value: u64) -> KmerCount {
    KmerCount {
        kmer: kmer.to_string(),
        value,
    }
}

/// A/C-only 21-mer that clears every disqualifying rule in the standard
/// battery (no GC clamp, no repeats, no shared window with its G/T-only
/// reverse complement, GC fraction 12/21).
const CLEAN_KMER: &str = "CCACCAACCAACCCAACAACC";

/// 21-mer disqualified by GC content and the G run.
const GC_HEAVY_KMER: &str = "GGGGGGGGGGGGGGGGGGGGG";

#[test]
fn test_kfilter_then_annotate() {
    // The filter set ends up holding the one sub-k-mer common to the
    // target and the unwanted list.
    let filter_file = create_file("AACCAACCCAACAACC\t3\nACGTACGTACGTACGT\t8\n");

    let source = VecSource::new()
        .with_records(
            16,
            vec![
                kc("AACCAACCCAACAACC", 1), // CLEAN_KMER window at offset 5
                kc("GGGGGGGGGGGGGGGG", 1),
            ],
        )
        .with_records(
            21,
            vec![kc(CLEAN_KMER, 0), kc(GC_HEAVY_KMER, 0), kc("CCACCAACCAACCCAACAACA", 0)],
        );

    let scratch = tempfile::tempdir().unwrap();
    let kfilter = KfilterCommand {
        k: 21,
        sub_k: 16,
        filter_gz: Some(false),
        indexed: true,
    };

    let mut filtered = Vec::new();
    let stats = kfilter
        .run(&source, &[], filter_file.path(), scratch.path(), &mut filtered)
        .unwrap();

    // CLEAN_KMER contains the filtered sub-k-mer; the other two pass.
    assert_eq!(stats.records, 3);
    assert_eq!(stats.kept, 2);

    let filtered_text = String::from_utf8(filtered).unwrap();
    assert_eq!(
        filtered_text,
        format!(
            "{},0,0\n{},1,1\nCCACCAACCAACCCAACAACA,1,2\n",
            CLEAN_KMER, GC_HEAVY_KMER
        )
    );

    // Annotate the sweep output.
    let annotate = AnnotateCommand::new();
    let mut annotated = Vec::new();
    let rows = annotate
        .run(filtered_text.as_bytes(), &mut annotated)
        .unwrap();
    assert_eq!(rows, 3);

    let text = String::from_utf8(annotated).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);

    // Filter-failed row scores 0 even though its rules pass.
    let clean: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(clean[2], "F");
    assert_eq!(*clean.last().unwrap(), "0");

    // Rule-disqualified row scores 0 despite passing the filter.
    let heavy: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(heavy[2], "T");
    assert_eq!(*heavy.last().unwrap(), "0");

    // Clean row passing both keeps its positional bonuses.
    let kept: Vec<&str> = lines[3].split(',').collect();
    assert_eq!(kept[2], "T");
    assert_ne!(*kept.last().unwrap(), "0");
}

#[test]
fn test_annotate_with_gene_and_conservation() {
    let gene_file = create_file("geneA\t100\t200\ngeneB\t300\t400\n");
    let cons_file = create_file(&format!("{},0.95\n{},0.5\n", CLEAN_KMER, GC_HEAVY_KMER));

    let annotate = AnnotateCommand {
        gene_file: Some(gene_file.path().to_path_buf()),
        conservation_file: Some(cons_file.path().to_path_buf()),
        reverse: true,
        unfiltered_score: true,
        ..AnnotateCommand::new()
    };

    // Position 150 sits in geneA; position 50 is non-genic.
    let input = format!("{},1,150\n{},1,50\n", CLEAN_KMER, CLEAN_KMER);
    let mut out = Vec::new();
    annotate.run(input.as_bytes(), &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);

    let header: Vec<&str> = lines[0].split(',').collect();
    assert_eq!(header[0], "Kmer");
    assert!(header.contains(&"Fwd Conservation"));
    assert!(header.contains(&"Fwd Cons Thresh"));
    assert!(header.contains(&"Fwd Gene"));
    assert!(header.contains(&"Rev Gene"));
    assert!(header.contains(&"Fwd No Filt Score"));
    assert_eq!(*header.last().unwrap(), "Rev No Filt Score");

    let genic: Vec<&str> = lines[1].split(',').collect();
    assert!(genic.contains(&"geneA"));
    assert!(genic.contains(&"0.95"));

    // Non-genic + default filtering config: the gene rule disqualifies,
    // so the forward score column is 0.
    let score_idx = header.iter().position(|h| *h == "Fwd Score").unwrap();
    let nongenic: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(nongenic[score_idx], "0");
    assert_ne!(genic[score_idx], "0");
}

#[test]
fn test_annotate_only_keeps_lookups_neutral() {
    let gene_file = create_file("geneA\t100\t200\n");

    let annotate = AnnotateCommand {
        gene_file: Some(gene_file.path().to_path_buf()),
        annotate_only: true,
        ..AnnotateCommand::new()
    };

    // Non-genic position: annotation-only mode must not disqualify.
    let input = format!("{},1,50\n", CLEAN_KMER);
    let mut out = Vec::new();
    annotate.run(input.as_bytes(), &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let row: Vec<&str> = text.lines().nth(1).unwrap().split(',').collect();
    assert_ne!(*row.last().unwrap(), "0");
}

#[test]
fn test_annotate_profile_changes_gc_band() {
    // 7/21 GC = 33.3%: outside 40-60, inside 30-52.
    let kmer = "CAACAACAACAACAACAACAA";
    let input = format!("{},1,0\n", kmer);

    let strict = AnnotateCommand::new();
    let mut out = Vec::new();
    strict.run(input.as_bytes(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().nth(1).unwrap().ends_with(",0"));

    let relaxed = AnnotateCommand {
        profile: GcProfile::Band30To52,
        ..AnnotateCommand::new()
    };
    let mut out = Vec::new();
    relaxed.run(input.as_bytes(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(!text.lines().nth(1).unwrap().ends_with(",0"));
}

#[test]
fn test_bad_gene_file_aborts_annotation() {
    let gene_file = create_file("geneA\t100\t200\ngeneB\t150\t250\n"); // overlap

    let annotate = AnnotateCommand {
        gene_file: Some(gene_file.path().to_path_buf()),
        ..AnnotateCommand::new()
    };

    let input = format!("{},1,150\n", CLEAN_KMER);
    let mut out = Vec::new();
    let err = annotate.run(input.as_bytes(), &mut out).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("overlaps"), "unexpected error: {}", msg);
    assert!(msg.contains(":2:"), "missing line number: {}", msg);
}

#[test]
fn test_conserv_roundtrips_into_annotation() {
    // VecSource serves the same stream for every input, so both k-mers
    // appear in both reference records.
    let source =
        VecSource::new().with_records(21, vec![kc(CLEAN_KMER, 1), kc("CCACCAACCAACCCAACAACA", 1)]);

    let conserv = ConservCommand { k: 21 };
    let inputs = vec![PathBuf::from("ref1.fa"), PathBuf::from("ref2.fa")];
    let mut table_out = Vec::new();
    let records = conserv.run(&source, &inputs, &mut table_out).unwrap();
    assert_eq!(records, 2);

    let table_text = String::from_utf8(table_out).unwrap();
    assert!(table_text.starts_with("#kmer,score\n"));

    // Feed the built table straight back into the annotation pass.
    let cons_file = create_file(&table_text);
    let annotate = AnnotateCommand {
        conservation_file: Some(cons_file.path().to_path_buf()),
        annotate_only: true,
        ..AnnotateCommand::new()
    };

    let input = format!("{},1,0\n", CLEAN_KMER);
    let mut out = Vec::new();
    annotate.run(input.as_bytes(), &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let row: Vec<&str> = text.lines().nth(1).unwrap().split(',').collect();
    assert!(row.contains(&"1"), "conservation cell missing: {}", text);
}
