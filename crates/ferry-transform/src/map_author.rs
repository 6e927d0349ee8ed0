use crate::transformation::Transformation;
use crate::work::TransformWork;
use ferry_core::{Author, Console, FerryError, Result};
use std::collections::BTreeMap;

/// Rewrites the author of the migrated change.
///
/// Keys are matched in three tiers: a full `Name <email>` author string,
/// then an email, then a bare name. The first tier with a hit wins.
#[derive(Debug, Clone)]
pub struct MapAuthor {
    author_to_author: BTreeMap<String, Author>,
    mail_to_author: BTreeMap<String, Author>,
    name_to_author: BTreeMap<String, Author>,
    reversible: bool,
    fail_if_not_found: bool,
    fail_if_not_found_in_reverse: bool,
}

impl MapAuthor {
    pub fn new<'m, I>(
        map: I,
        reversible: bool,
        fail_if_not_found: bool,
        fail_if_not_found_in_reverse: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (&'m str, &'m str)>,
    {
        let mut author_to_author = BTreeMap::new();
        let mut mail_to_author = BTreeMap::new();
        let mut name_to_author = BTreeMap::new();
        for (key, value) in map {
            let to = Author::parse(value)?;
            if let Ok(from) = Author::parse(key) {
                author_to_author.insert(from.to_string(), to);
            } else if key.contains('@') {
                mail_to_author.insert(key.to_string(), to);
            } else {
                name_to_author.insert(key.to_string(), to);
            }
        }
        Ok(Self {
            author_to_author,
            mail_to_author,
            name_to_author,
            reversible,
            fail_if_not_found,
            fail_if_not_found_in_reverse,
        })
    }

    /// The mapped author, or `None` when no tier matches.
    pub fn lookup(&self, author: &Author) -> Option<&Author> {
        self.author_to_author
            .get(&author.to_string())
            .or_else(|| self.mail_to_author.get(&author.email))
            .or_else(|| self.name_to_author.get(&author.name))
    }
}

impl Transformation for MapAuthor {
    fn transform<'a>(
        &self,
        work: TransformWork<'a>,
        _console: &dyn Console,
    ) -> Result<TransformWork<'a>> {
        match self.lookup(work.author()) {
            Some(mapped) => {
                let mapped = mapped.clone();
                Ok(work.set_author(mapped))
            }
            None if self.fail_if_not_found => Err(FerryError::validation(format!(
                "Cannot find a mapping for author '{}'",
                work.author()
            ))),
            None => Ok(work),
        }
    }

    fn reverse(&self) -> Result<Box<dyn Transformation>> {
        if !self.reversible {
            return Err(FerryError::NonReversible(
                "Author mapping doesn't have reversible enabled".into(),
            ));
        }
        if !self.mail_to_author.is_empty() {
            return Err(FerryError::NonReversible(format!(
                "author mapping is not reversible because it contains mail -> author mappings. \
                 Only author -> author is reversible: {:?}",
                self.mail_to_author.keys().collect::<Vec<_>>()
            )));
        }
        if !self.name_to_author.is_empty() {
            return Err(FerryError::NonReversible(format!(
                "author mapping is not reversible because it contains name -> author mappings. \
                 Only author -> author is reversible: {:?}",
                self.name_to_author.keys().collect::<Vec<_>>()
            )));
        }
        let mut reverse = BTreeMap::new();
        for (from, to) in &self.author_to_author {
            let original = Author::parse(from)?;
            if let Some(previous) = reverse.insert(to.to_string(), original) {
                return Err(FerryError::NonReversible(format!(
                    "non-reversible author map: '{to}' is the target of both '{previous}' and '{from}'"
                )));
            }
        }
        Ok(Box::new(MapAuthor {
            author_to_author: reverse,
            mail_to_author: BTreeMap::new(),
            name_to_author: BTreeMap::new(),
            reversible: self.reversible,
            fail_if_not_found: self.fail_if_not_found_in_reverse,
            fail_if_not_found_in_reverse: self.fail_if_not_found,
        }))
    }

    fn describe(&self) -> String {
        "Mapping authors".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Metadata;
    use ferry_core::{Revision, TestingConsole};

    fn map_author(author: &str, t: &dyn Transformation) -> Result<String> {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let work = TransformWork::new(
            tmp.path(),
            Metadata::new("msg", Author::parse(author).unwrap()),
            &[],
            &rev,
            false,
        );
        Ok(t.transform(work, &TestingConsole::new())?.author().to_string())
    }

    #[test]
    fn exact_tier_wins_over_mail() {
        let t = MapAuthor::new(
            [("A <a@x>", "B <b@x>"), ("a@x", "C <c@x>")],
            false,
            false,
            false,
        )
        .unwrap();
        assert_eq!(map_author("A <a@x>", &t).unwrap(), "B <b@x>");
        // Same email, different name: exact tier misses, mail tier hits.
        assert_eq!(map_author("Other <a@x>", &t).unwrap(), "C <c@x>");
    }

    #[test]
    fn name_tier_is_last() {
        let t = MapAuthor::new([("Jane", "J <j@corp>")], false, false, false).unwrap();
        assert_eq!(map_author("Jane <jane@home>", &t).unwrap(), "J <j@corp>");
        assert_eq!(map_author("Bob <bob@home>", &t).unwrap(), "Bob <bob@home>");
    }

    #[test]
    fn fail_if_not_found() {
        let t = MapAuthor::new([("a@x", "C <c@x>")], false, true, false).unwrap();
        let err = map_author("Bob <bob@home>", &t).unwrap_err();
        assert!(err.is_validation());
        assert!(err
            .to_string()
            .contains("Cannot find a mapping for author 'Bob <bob@home>'"));
    }

    #[test]
    fn invalid_target_is_rejected() {
        assert!(MapAuthor::new([("a@x", "not an author")], false, false, false).is_err());
    }

    #[test]
    fn reverse_swaps_and_flips_policies() {
        let t = MapAuthor::new([("A <a@x>", "B <b@x>")], true, false, true).unwrap();
        let rev = t.reverse().unwrap();
        assert_eq!(map_author("B <b@x>", rev.as_ref()).unwrap(), "A <a@x>");
        // Reverse fails on unknown authors because fail_if_not_found_in_reverse was set.
        assert!(map_author("Z <z@x>", rev.as_ref()).is_err());
        // And the forward not-found policy moved to the reverse's reverse.
        let back = rev.reverse().unwrap();
        assert_eq!(map_author("Z <z@x>", back.as_ref()).unwrap(), "Z <z@x>");
    }

    #[test]
    fn reverse_refusals() {
        let not_enabled = MapAuthor::new([("A <a@x>", "B <b@x>")], false, false, false).unwrap();
        assert!(matches!(
            not_enabled.reverse().unwrap_err(),
            FerryError::NonReversible(m) if m.contains("reversible enabled")
        ));

        let mail = MapAuthor::new([("a@x", "B <b@x>")], true, false, false).unwrap();
        assert!(matches!(mail.reverse().unwrap_err(), FerryError::NonReversible(_)));

        let name = MapAuthor::new([("Jane", "B <b@x>")], true, false, false).unwrap();
        assert!(matches!(name.reverse().unwrap_err(), FerryError::NonReversible(_)));

        let collision = MapAuthor::new(
            [("A <a@x>", "B <b@x>"), ("C <c@x>", "B <b@x>")],
            true,
            false,
            false,
        )
        .unwrap();
        let err = collision.reverse().unwrap_err();
        assert!(err.to_string().contains("non-reversible author map"));
    }
}
