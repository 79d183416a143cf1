//! License file discovery and SPDX identification from license text.

use std::sync::OnceLock;

use regex::Regex;

use crate::repo::{EntryKind, RepoEntry};

const LICENSE_STEMS: [&str; 4] = ["license", "licence", "copying", "unlicense"];
const LICENSE_SUFFIXES: [&str; 3] = ["", ".md", ".txt"];

/// Returns the root license file, preferring stem order then suffix order.
pub fn find_license_file(entries: &[RepoEntry]) -> Option<&RepoEntry> {
    let files: Vec<&RepoEntry> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .collect();
    for stem in LICENSE_STEMS {
        for suffix in LICENSE_SUFFIXES {
            let wanted = format!("{}{}", stem, suffix);
            if let Some(entry) = files.iter().find(|e| e.name.eq_ignore_ascii_case(&wanted)) {
                return Some(entry);
            }
        }
    }
    None
}

struct Rule {
    id: &'static str,
    /// Every marker must occur in the normalized text.
    markers: &'static [&'static str],
}

// Ordered: more specific texts first (AGPL/LGPL before GPL, BSD-3 before BSD-2).
const RULES: &[Rule] = &[
    Rule {
        id: "AGPL-3.0",
        markers: &["gnu affero general public license", "version 3"],
    },
    Rule {
        id: "LGPL-3.0",
        markers: &["gnu lesser general public license", "version 3"],
    },
    Rule {
        id: "LGPL-2.1",
        markers: &["gnu lesser general public license", "version 2.1"],
    },
    Rule {
        id: "GPL-3.0",
        markers: &["gnu general public license", "version 3"],
    },
    Rule {
        id: "GPL-2.0",
        markers: &["gnu general public license", "version 2"],
    },
    Rule {
        id: "Apache-2.0",
        markers: &["apache license", "version 2.0"],
    },
    Rule {
        id: "MPL-2.0",
        markers: &["mozilla public license", "2.0"],
    },
    Rule {
        id: "BSL-1.0",
        markers: &["boost software license", "version 1.0"],
    },
    Rule {
        id: "Unlicense",
        markers: &[
            "this is free and unencumbered software released into the public domain",
        ],
    },
    Rule {
        id: "CC0-1.0",
        markers: &["cc0 1.0 universal"],
    },
    Rule {
        id: "BSD-3-Clause",
        markers: &[
            "redistribution and use in source and binary forms",
            "neither the name of",
        ],
    },
    Rule {
        id: "BSD-2-Clause",
        markers: &["redistribution and use in source and binary forms"],
    },
    Rule {
        id: "ISC",
        markers: &[
            "permission to use, copy, modify, and/or distribute this software for any purpose with or without fee is hereby granted",
        ],
    },
    Rule {
        id: "MIT",
        markers: &["permission is hereby granted, free of charge, to any person obtaining a copy"],
    },
];

/// Title lines that name a license on their own. Consulted only when no body
/// rule matches, so trimmed copies with a standard heading still identify.
const TITLES: &[(&str, &str)] = &[
    ("mit license", "MIT"),
    ("the mit license", "MIT"),
    ("the mit license (mit)", "MIT"),
    ("isc license", "ISC"),
    ("the unlicense", "Unlicense"),
    ("bsd 3-clause license", "BSD-3-Clause"),
    ("bsd 2-clause license", "BSD-2-Clause"),
    ("apache license 2.0", "Apache-2.0"),
    ("apache license, version 2.0", "Apache-2.0"),
    ("mozilla public license version 2.0", "MPL-2.0"),
];

fn spdx_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\W*SPDX-License-Identifier:\s*([A-Za-z0-9.+-]+)")
            .unwrap_or_else(|e| panic!("invalid SPDX regex: {e}"))
    })
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c| c == '*' || c == '#'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identifies the SPDX id of a license text. An explicit
/// `SPDX-License-Identifier:` line wins over text matching.
pub fn identify(text: &str) -> Option<String> {
    if let Some(caps) = spdx_tag().captures(text) {
        return Some(caps[1].to_string());
    }
    let normalized = normalize(text);
    if let Some(rule) = RULES
        .iter()
        .find(|rule| rule.markers.iter().all(|m| normalized.contains(m)))
    {
        return Some(rule.id.to_string());
    }
    let title = text.lines().map(normalize).find(|l| !l.is_empty())?;
    TITLES
        .iter()
        .find(|(heading, _)| title == *heading)
        .map(|(_, id)| id.to_string())
}

pub fn is_allowed(spdx: &str, allow: &[String]) -> bool {
    allow.iter().any(|a| a.trim().eq_ignore_ascii_case(spdx))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const MIT_TEXT: &str = "MIT License

Copyright (c) 2025 Alice

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
";

    #[test]
    fn identifies_mit() {
        assert_eq!(identify(MIT_TEXT).as_deref(), Some("MIT"));
    }

    #[test]
    fn identifies_mit_from_grant_sentence_without_full_text() {
        let trimmed = "Copyright (c) 2025 Student\n\nPermission is hereby granted, free of charge, to any person obtaining a copy...";
        assert_eq!(identify(trimmed).as_deref(), Some("MIT"));
    }

    #[test]
    fn identifies_from_title_heading() {
        let headed = "MIT License\n\nCopyright (c) 2025 Student\n\nSee the usual terms.";
        assert_eq!(identify(headed).as_deref(), Some("MIT"));
        assert_eq!(identify("# The MIT License (MIT)\n\n...").as_deref(), Some("MIT"));
        assert_eq!(identify("ISC License\n").as_deref(), Some("ISC"));
        // The heading must stand alone; prose mentioning it is not enough.
        assert_eq!(identify("Not quite an MIT License file").as_deref(), None);
    }

    #[test]
    fn identifies_by_spdx_tag() {
        assert_eq!(
            identify("// SPDX-License-Identifier: Apache-2.0\n").as_deref(),
            Some("Apache-2.0")
        );
    }

    #[test]
    fn identifies_gpl_family_specifically() {
        let agpl = "GNU AFFERO GENERAL PUBLIC LICENSE\n Version 3, 19 November 2007";
        assert_eq!(identify(agpl).as_deref(), Some("AGPL-3.0"));
        let gpl = "GNU GENERAL PUBLIC LICENSE\n                       Version 3, 29 June 2007";
        assert_eq!(identify(gpl).as_deref(), Some("GPL-3.0"));
        let apache = "Apache License\nVersion 2.0, January 2004\nhttp://www.apache.org/licenses/";
        assert_eq!(identify(apache).as_deref(), Some("Apache-2.0"));
    }

    #[test]
    fn unknown_text_is_unrecognized() {
        assert_eq!(identify("All rights reserved. Do not copy."), None);
        assert_eq!(identify(""), None);
    }

    #[test]
    fn finds_license_variants_case_insensitively() {
        let entries = vec![
            RepoEntry::file("README.md"),
            RepoEntry::file("licence.TXT"),
            RepoEntry::file("index.html"),
        ];
        assert_eq!(find_license_file(&entries).unwrap().name, "licence.TXT");

        let entries = vec![RepoEntry::file("COPYING"), RepoEntry::file("LICENSE.md")];
        assert_eq!(find_license_file(&entries).unwrap().name, "LICENSE.md");

        let entries = vec![RepoEntry::file("LICENSE-MIT"), RepoEntry::file("license.rst")];
        assert!(find_license_file(&entries).is_none());
    }

    #[test]
    fn directories_are_not_license_files() {
        let entries = vec![RepoEntry {
            name: "LICENSE".into(),
            path: "LICENSE".into(),
            kind: EntryKind::Dir,
        }];
        assert!(find_license_file(&entries).is_none());
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let allow = vec!["MIT".to_string(), "apache-2.0".to_string()];
        assert!(is_allowed("mit", &allow));
        assert!(is_allowed("Apache-2.0", &allow));
        assert!(!is_allowed("GPL-3.0", &allow));
    }
}
