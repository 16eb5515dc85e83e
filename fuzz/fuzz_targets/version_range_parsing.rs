#![no_main]
use libfuzzer_sys::fuzz_target;
use mfe_orchestrator::module::registry::{satisfies_range, DependencySpec, Version, VersionRange};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Split into a version and a range at the first newline
    let (version, range) = text.split_once('\n').unwrap_or((text, "*"));

    let parsed = Version::parse(version);
    let parsed_range = VersionRange::parse(range);
    let satisfied = satisfies_range(version, range);

    // Unparsable input fails closed; `*` accepts anything
    if parsed_range.is_none() || (parsed.is_none() && parsed_range != Some(VersionRange::Any)) {
        assert!(!satisfied);
    }
    if let (Some(v), Some(r)) = (parsed, parsed_range) {
        assert_eq!(r.matches(&v), satisfied);
        // A version always satisfies itself exactly
        assert!(satisfies_range(&v.to_string(), &v.to_string()));
    }

    // Dependency specs always carry a range
    let spec = DependencySpec::parse(text);
    assert!(!spec.range.is_empty());
});
