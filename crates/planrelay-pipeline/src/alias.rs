//! Named search configurations.
//!
//! An alias expands to the search option vector handed to the search
//! stage, e.g. `seq-opt-lmcut` → `["--search", "astar(lmcut())"]`.
//! Spaces and newlines are stripped from every option on expansion, so
//! long configurations can be laid out readably here.

use crate::error::PipelineError;

struct Alias {
    name: &'static str,
    options: &'static [&'static str],
}

const ALIASES: &[Alias] = &[
    Alias {
        name: "seq-opt-lmcut",
        options: &["--search", "astar(lmcut())"],
    },
    Alias {
        name: "seq-opt-bjolp",
        options: &[
            "--evaluator",
            "lmc=lmcount(lm_merged([lm_rhw(),lm_hm(m=1)]),admissible=true)",
            "--search",
            "astar(lmc,lazy_evaluator=lmc)",
        ],
    },
    Alias {
        name: "lama-first",
        options: &[
            "--evaluator",
            "hlm=lmcount(lm_factory=lm_rhw(reasonable_orders=true),transform=adapt_costs(one),pref=false)",
            "--evaluator",
            "hff=ff(transform=adapt_costs(one))",
            "--search",
            "lazy_greedy([hff, hlm], preferred=[hff, hlm],
                         cost_type=one, reopen_closed=false)",
        ],
    },
    Alias {
        name: "seq-opt-selmax",
        options: &[
            "--search",
            "astar(selmax([lmcut(),lmcount(lm_merged([lm_hm(m=1),lm_rhw()]),admissible=true)],training_set=1000),mpd=true)",
        ],
    },
    Alias {
        name: "seq-opt-fd-autotune",
        options: &[
            "--heuristic",
            "hlmcut=lmcut()",
            "--heuristic",
            "hhmax=hmax()",
            "--heuristic",
            "hselmax=selmax([hlmcut,hhmax],alpha=4,classifier=0,conf_threshold=0.85,training_set=10,sample=0,uniform=true)",
            "--search",
            "astar(hselmax,mpd=false,pathmax=true,cost_type=normal)",
        ],
    },
];

/// Search options for `name`.
pub fn expand(name: &str) -> Result<Vec<String>, PipelineError> {
    ALIASES
        .iter()
        .find(|alias| alias.name == name)
        .map(|alias| alias.options.iter().map(|s| compact(s)).collect())
        .ok_or_else(|| {
            PipelineError::Config(format!(
                "unknown alias '{name}' (known: {})",
                names().collect::<Vec<_>>().join(", ")
            ))
        })
}

fn compact(option: &str) -> String {
    option.chars().filter(|c| *c != ' ' && *c != '\n').collect()
}

/// All known alias names, in table order.
pub fn names() -> impl Iterator<Item = &'static str> {
    ALIASES.iter().map(|alias| alias.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lmcut_expands_to_astar() {
        assert_eq!(expand("seq-opt-lmcut").unwrap(), vec!["--search", "astar(lmcut())"]);
    }

    #[test]
    fn autotune_defines_heuristics_before_search() {
        let options = expand("seq-opt-fd-autotune").unwrap();
        assert_eq!(options.len(), 8);
        assert_eq!(options[0], "--heuristic");
        assert_eq!(options[6], "--search");
    }

    #[test]
    fn bjolp_names_its_evaluator() {
        assert_eq!(
            expand("seq-opt-bjolp").unwrap(),
            vec![
                "--evaluator",
                "lmc=lmcount(lm_merged([lm_rhw(),lm_hm(m=1)]),admissible=true)",
                "--search",
                "astar(lmc,lazy_evaluator=lmc)",
            ]
        );
    }

    #[test]
    fn lama_first_is_compacted_into_one_search_option() {
        let options = expand("lama-first").unwrap();
        assert_eq!(options.len(), 6);
        assert_eq!(options[4], "--search");
        assert_eq!(
            options[5],
            "lazy_greedy([hff,hlm],preferred=[hff,hlm],cost_type=one,reopen_closed=false)"
        );
        assert!(options.iter().all(|o| !o.contains(' ') && !o.contains('\n')));
    }

    #[test]
    fn unknown_alias_lists_known_names() {
        let err = expand("seq-opt-nothing").unwrap_err().to_string();
        assert!(err.contains("seq-opt-bjolp"), "{err}");
    }

    #[test]
    fn names_are_unique() {
        let mut all: Vec<_> = names().collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
