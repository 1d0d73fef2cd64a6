//! Content model matching
//!
//! Matches the element children of an instance element against the particle
//! tree of its complex type. Every particle is evaluated as the set of
//! positions where it can stop when started at a given child, memoized per
//! particle and start position, so nested repetitions and choices stay
//! polynomial in the number of children.
//!
//! On failure the furthest position any particle reached is reported,
//! together with the names that would have been accepted there.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use roxmltree::Node;

use super::xsd_model::{Compositor, Particle, Term, XsdModel};

/// Why a content model does not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// The child at `index` cannot appear where it does
    Unexpected {
        /// Index into the element children
        index: usize,
        /// Names accepted at that position
        expected: Vec<String>,
    },
    /// The children end before the content model is complete
    Missing {
        /// Names still required
        expected: Vec<String>,
    },
}

impl ContentError {
    /// Message in the form reported by XSD validators
    pub fn message(&self) -> String {
        match self {
            ContentError::Unexpected { expected, .. } if expected.is_empty() => {
                "This element is not expected.".to_string()
            }
            ContentError::Unexpected { expected, .. } => {
                format!("This element is not expected. {}", expected_list(expected))
            }
            ContentError::Missing { expected } => {
                format!("Missing child element(s). {}", expected_list(expected))
            }
        }
    }
}

fn expected_list(names: &[String]) -> String {
    if names.len() == 1 {
        format!("Expected is ( {} ).", names[0])
    } else {
        format!("Expected is one of ( {} ).", names.join(", "))
    }
}

/// Match `children` against `particle`
pub fn match_content(
    model: &XsdModel,
    particle: &Particle,
    children: &[Node],
) -> Result<(), ContentError> {
    let mut matcher = Matcher {
        model,
        children,
        memo: HashMap::new(),
        furthest: 0,
        expected: IndexMap::new(),
    };

    let ends = matcher.ends(particle, 0);
    if ends.contains(&children.len()) {
        return Ok(());
    }
    for end in ends {
        matcher.reach(end);
    }

    let Matcher {
        furthest, expected, ..
    } = matcher;
    if furthest < children.len() {
        return Err(ContentError::Unexpected {
            index: furthest,
            expected: expected.into_keys().collect(),
        });
    }

    let required: Vec<String> = expected
        .iter()
        .filter(|(_, required)| **required)
        .map(|(name, _)| name.clone())
        .collect();
    let expected = if required.is_empty() {
        expected.into_keys().collect()
    } else {
        required
    };
    Err(ContentError::Missing { expected })
}

struct Matcher<'m, 'n, 'a, 'input> {
    model: &'m XsdModel,
    children: &'n [Node<'a, 'input>],
    memo: HashMap<(*const Particle, usize), Vec<usize>>,
    furthest: usize,
    /// Names tried at `furthest`, with whether the model required them
    expected: IndexMap<String, bool>,
}

impl<'m, 'n, 'a, 'input> Matcher<'m, 'n, 'a, 'input> {
    fn reach(&mut self, pos: usize) {
        if pos > self.furthest {
            self.furthest = pos;
            self.expected.clear();
        }
    }

    fn record(&mut self, pos: usize, name: &str, required: bool) {
        self.reach(pos);
        if pos == self.furthest {
            *self.expected.entry(name.to_string()).or_insert(false) |= required;
        }
    }

    /// Positions where `particle` can stop when started at `start`
    fn ends(&mut self, particle: &Particle, start: usize) -> Vec<usize> {
        let key = (particle as *const Particle, start);
        if let Some(ends) = self.memo.get(&key) {
            return ends.clone();
        }

        let occurs = particle.occurs;
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        if occurs.min == 0 {
            seen.insert(start);
            results.push(start);
        }

        let mut frontier = vec![start];
        let mut count = 0u32;
        while !frontier.is_empty() && occurs.max.map_or(true, |max| count < max) {
            let required = count < occurs.min;
            let mut next = Vec::new();
            let mut next_seen = HashSet::new();
            for pos in frontier {
                for end in self.term_ends(&particle.term, pos, required) {
                    if end == pos {
                        // an empty match satisfies the remaining minimum
                        if seen.insert(pos) {
                            results.push(pos);
                        }
                    } else if next_seen.insert(end) {
                        next.push(end);
                    }
                }
            }
            count += 1;

            if count >= occurs.min {
                next.retain(|end| seen.insert(*end));
                results.extend(next.iter().copied());
            }
            frontier = next;
        }

        results.sort_unstable();
        self.memo.insert(key, results.clone());
        results
    }

    fn term_ends(&mut self, term: &Term, pos: usize, required: bool) -> Vec<usize> {
        let (model, children) = (self.model, self.children);
        match term {
            Term::Element(id) => {
                let decl = model.element(*id);
                match children.get(pos) {
                    Some(child) if decl.matches(*child) => vec![pos + 1],
                    _ => {
                        self.record(pos, &decl.name, required);
                        Vec::new()
                    }
                }
            }
            Term::Any(wildcard) => match children.get(pos) {
                Some(child) if wildcard.allows(child.tag_name().namespace()) => vec![pos + 1],
                _ => {
                    self.record(pos, wildcard.describe(), required);
                    Vec::new()
                }
            },
            Term::Group(Compositor::Sequence, members) => {
                let mut positions = vec![pos];
                for member in members {
                    let mut next = Vec::new();
                    for start in positions {
                        for end in self.ends(member, start) {
                            if !next.contains(&end) {
                                next.push(end);
                            }
                        }
                    }
                    if next.is_empty() {
                        return next;
                    }
                    positions = next;
                }
                positions
            }
            Term::Group(Compositor::Choice, members) => {
                let mut positions = Vec::new();
                for member in members {
                    for end in self.ends(member, pos) {
                        if !positions.contains(&end) {
                            positions.push(end);
                        }
                    }
                }
                positions
            }
            Term::Group(Compositor::All, members) => self.all_ends(members, pos),
        }
    }

    /// `xs:all`: every member at most once, in any order
    fn all_ends(&mut self, members: &[Particle], pos: usize) -> Vec<usize> {
        let required_mask = members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.occurs.min > 0)
            .fold(0u64, |mask, (i, _)| mask | (1 << i));

        let mut positions = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = vec![(pos, 0u64)];
        while let Some((at, used)) = queue.pop() {
            if !visited.insert((at, used)) {
                continue;
            }
            if used & required_mask == required_mask && !positions.contains(&at) {
                positions.push(at);
            }
            for (i, member) in members.iter().enumerate() {
                if used & (1 << i) != 0 {
                    continue;
                }
                for end in self.ends(member, at) {
                    if end > at {
                        queue.push((end, used | (1 << i)));
                    }
                }
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::xsd_model::{Content, TypeDef, XsdModel};

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
        <xs:element name="Seq">
            <xs:complexType>
                <xs:sequence>
                    <xs:element name="Head" minOccurs="0"/>
                    <xs:element name="Item" maxOccurs="unbounded"/>
                    <xs:choice minOccurs="0">
                        <xs:element name="X"/>
                        <xs:element name="Y"/>
                    </xs:choice>
                </xs:sequence>
            </xs:complexType>
        </xs:element>
        <xs:element name="All">
            <xs:complexType>
                <xs:all>
                    <xs:element name="A"/>
                    <xs:element name="B" minOccurs="0"/>
                </xs:all>
            </xs:complexType>
        </xs:element>
    </xs:schema>"#;

    fn check(root: &str, xml: &str) -> Result<(), ContentError> {
        let model = XsdModel::compile(SCHEMA).unwrap();
        let id = model.global_element(None, root).unwrap();
        let TypeDef::Complex(ct) = model.element(id).type_def else {
            panic!("complex type expected");
        };
        let Content::Elements(particle) = &model.complex_type(ct).content else {
            panic!("element content expected");
        };
        let doc = roxmltree::Document::parse(xml).unwrap();
        let children: Vec<_> = doc.root_element().children().filter(|n| n.is_element()).collect();
        match_content(&model, particle, &children)
    }

    #[test]
    fn test_sequence_matches() {
        assert_eq!(check("Seq", "<Seq><Item/></Seq>"), Ok(()));
        assert_eq!(check("Seq", "<Seq><Head/><Item/><Item/><Y/></Seq>"), Ok(()));
    }

    #[test]
    fn test_unexpected_child_lists_alternatives() {
        let err = check("Seq", "<Seq><Item/><Head/></Seq>").unwrap_err();
        assert_eq!(
            err,
            ContentError::Unexpected {
                index: 1,
                expected: vec!["Item".into(), "X".into(), "Y".into()],
            }
        );
        assert_eq!(
            err.message(),
            "This element is not expected. Expected is one of ( Item, X, Y )."
        );
    }

    #[test]
    fn test_missing_child_lists_required_names() {
        let err = check("Seq", "<Seq><Head/></Seq>").unwrap_err();
        assert_eq!(err.message(), "Missing child element(s). Expected is ( Item ).");
    }

    #[test]
    fn test_nothing_expected_after_complete_model() {
        let err = check("Seq", "<Seq><Item/><X/><Y/></Seq>").unwrap_err();
        assert_eq!(
            err,
            ContentError::Unexpected {
                index: 2,
                expected: vec![],
            }
        );
        assert_eq!(err.message(), "This element is not expected.");
    }

    #[test]
    fn test_all_group_any_order() {
        assert_eq!(check("All", "<All><B/><A/></All>"), Ok(()));
        assert_eq!(check("All", "<All><A/></All>"), Ok(()));
        assert!(matches!(
            check("All", "<All><A/><A/></All>"),
            Err(ContentError::Unexpected { index: 1, .. })
        ));
        assert!(matches!(
            check("All", "<All><B/></All>"),
            Err(ContentError::Missing { .. })
        ));
    }
}
