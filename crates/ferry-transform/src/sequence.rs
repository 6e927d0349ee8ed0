use crate::transformation::Transformation;
use crate::work::TransformWork;
use ferry_core::{Console, PrefixConsole, Result};
use tracing::info;

/// Ordered composition of transformations.
#[derive(Debug)]
pub struct Sequence {
    elements: Vec<Box<dyn Transformation>>,
}

impl Sequence {
    /// Build a sequence. A single element is returned as-is instead of
    /// being wrapped.
    pub fn create(mut elements: Vec<Box<dyn Transformation>>) -> Box<dyn Transformation> {
        if elements.len() == 1 {
            if let Some(only) = elements.pop() {
                return only;
            }
        }
        Box::new(Sequence { elements })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Transformation for Sequence {
    fn transform<'a>(
        &self,
        work: TransformWork<'a>,
        console: &dyn Console,
    ) -> Result<TransformWork<'a>> {
        let total = self.elements.len();
        let mut work = work;
        for (i, transformation) in self.elements.iter().enumerate() {
            let msg = format!("[{:>2}/{total}] Transform {}", i + 1, transformation.describe());
            info!("{msg}");
            console.progress(&msg);
            let prefixed = PrefixConsole::new(format!("{msg}: "), console);
            work = transformation.transform(work.with_updated_tree_state(), &prefixed)?;
        }
        Ok(work)
    }

    /// Elements reversed, each one inverted. The first non-reversible
    /// element fails the whole sequence.
    fn reverse(&self) -> Result<Box<dyn Transformation>> {
        let mut reversed = Vec::with_capacity(self.elements.len());
        for element in self.elements.iter().rev() {
            reversed.push(element.reverse()?);
        }
        Ok(Box::new(Sequence { elements: reversed }))
    }

    fn describe(&self) -> String {
        "sequence".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Metadata;
    use ferry_core::console::MessageType;
    use ferry_core::{Author, FerryError, Revision, TestingConsole};
    use std::sync::{Arc, Mutex};

    /// Appends its tag to the message; reverse appends `tag'`.
    #[derive(Debug)]
    struct Tag {
        tag: String,
        reversible: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Tag {
        fn boxed(tag: &str, reversible: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Transformation> {
            Box::new(Tag {
                tag: tag.to_string(),
                reversible,
                log: log.clone(),
            })
        }
    }

    impl Transformation for Tag {
        fn transform<'a>(
            &self,
            work: TransformWork<'a>,
            _console: &dyn Console,
        ) -> Result<TransformWork<'a>> {
            self.log.lock().unwrap().push(self.tag.clone());
            let msg = format!("{}{}", work.message(), self.tag);
            Ok(work.set_message(msg))
        }

        fn reverse(&self) -> Result<Box<dyn Transformation>> {
            if !self.reversible {
                return Err(FerryError::NonReversible(format!("{} is lossy", self.tag)));
            }
            Ok(Tag::boxed(&format!("{}'", self.tag), true, &self.log))
        }

        fn describe(&self) -> String {
            format!("tag {}", self.tag)
        }
    }

    fn run(t: &dyn Transformation, console: &TestingConsole) -> String {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let work = TransformWork::new(
            tmp.path(),
            Metadata::new("", Author::new("A", "a@x")),
            &[],
            &rev,
            false,
        );
        t.transform(work, console).unwrap().message().to_string()
    }

    #[test]
    fn applies_in_order_with_progress() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seq = Sequence::create(vec![
            Tag::boxed("a", true, &log),
            Tag::boxed("b", true, &log),
            Tag::boxed("c", true, &log),
        ]);
        let console = TestingConsole::new();
        assert_eq!(run(seq.as_ref(), &console), "abc");
        assert_eq!(
            console.texts(MessageType::Progress),
            vec![
                "[ 1/3] Transform tag a",
                "[ 2/3] Transform tag b",
                "[ 3/3] Transform tag c"
            ]
        );
    }

    #[test]
    fn single_element_collapses() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let only = Sequence::create(vec![Tag::boxed("x", true, &log)]);
        assert_eq!(only.describe(), "tag x");
        let nested = Sequence::create(vec![Sequence::create(vec![
            Tag::boxed("a", true, &log),
            Tag::boxed("b", true, &log),
        ])]);
        assert_eq!(nested.describe(), "sequence");
    }

    #[test]
    fn reverse_inverts_order_and_elements() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seq = Sequence::create(vec![Tag::boxed("a", true, &log), Tag::boxed("b", true, &log)]);
        let rev = seq.reverse().unwrap();
        assert_eq!(run(rev.as_ref(), &TestingConsole::new()), "b'a'");
    }

    #[test]
    fn reverse_fails_fast_on_first_lossy_element() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seq = Sequence::create(vec![
            Tag::boxed("a", false, &log),
            Tag::boxed("b", true, &log),
            Tag::boxed("c", false, &log),
        ]);
        let err = seq.reverse().unwrap_err();
        assert!(matches!(err, FerryError::NonReversible(ref m) if m.contains("c is lossy")));
    }

    #[test]
    fn failure_stops_the_pipeline() {
        #[derive(Debug)]
        struct Fail;
        impl Transformation for Fail {
            fn transform<'a>(
                &self,
                _work: TransformWork<'a>,
                _console: &dyn Console,
            ) -> Result<TransformWork<'a>> {
                Err(FerryError::validation("boom"))
            }
            fn reverse(&self) -> Result<Box<dyn Transformation>> {
                Ok(Box::new(Fail))
            }
            fn describe(&self) -> String {
                "fail".into()
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let seq = Sequence::create(vec![
            Tag::boxed("a", true, &log),
            Box::new(Fail),
            Tag::boxed("b", true, &log),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let work = TransformWork::new(
            tmp.path(),
            Metadata::new("", Author::new("A", "a@x")),
            &[],
            &rev,
            false,
        );
        assert!(seq.transform(work, &TestingConsole::new()).is_err());
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }
}
