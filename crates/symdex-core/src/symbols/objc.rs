//! Objective-C method name parsing.
//!
//! Objective-C methods appear in symbol tables under their display name,
//! `-[Class(Category) selector:with:]` for instance methods and `+[...]` for
//! class methods. The table indexes the selector on its own and, for category
//! methods, also the name with the category removed.

/// A parsed Objective-C method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjCMethodName<'a>
{
    full: &'a str,
    class_name: &'a str,
    category: Option<&'a str>,
    selector: &'a str,
    is_class_method: Option<bool>,
}

impl<'a> ObjCMethodName<'a>
{
    /// Parse `name`.
    ///
    /// With `strict` set, the leading `+` or `-` is required; otherwise a bare
    /// `[Class selector]` is accepted too.
    #[must_use]
    pub fn parse(name: &'a str, strict: bool) -> Option<Self>
    {
        let (is_class_method, body) = match name.as_bytes().first()? {
            b'+' => (Some(true), &name[1..]),
            b'-' => (Some(false), &name[1..]),
            b'[' if !strict => (None, name),
            _ => return None,
        };
        let inner = body.strip_prefix('[')?.strip_suffix(']')?;
        let (class_part, selector) = inner.split_once(' ')?;
        if class_part.is_empty() || selector.is_empty() || selector.contains(' ') {
            return None;
        }

        let (class_name, category) = match class_part.split_once('(') {
            Some((class_name, rest)) => (class_name, Some(rest.strip_suffix(')')?)),
            None => (class_part, None),
        };
        if class_name.is_empty() {
            return None;
        }

        Some(Self {
            full: name,
            class_name,
            category,
            selector,
            is_class_method,
        })
    }

    /// The full name as given.
    #[must_use]
    pub fn full_name(&self) -> &'a str
    {
        self.full
    }

    #[must_use]
    pub fn class_name(&self) -> &'a str
    {
        self.class_name
    }

    #[must_use]
    pub fn category(&self) -> Option<&'a str>
    {
        self.category
    }

    /// The message name, e.g. `initWithFrame:`.
    #[must_use]
    pub fn selector(&self) -> &'a str
    {
        self.selector
    }

    /// `Some(true)` for `+` methods, `Some(false)` for `-`, `None` if the
    /// name carried no marker.
    #[must_use]
    pub fn is_class_method(&self) -> Option<bool>
    {
        self.is_class_method
    }

    /// The name with the `(Category)` part removed, or `None` if there is no
    /// category.
    ///
    /// ```rust
    /// use symdex_core::symbols::objc::ObjCMethodName;
    ///
    /// let name = ObjCMethodName::parse("-[NSString(Extras) reversed]", true).unwrap();
    /// assert_eq!(name.full_name_without_category().as_deref(), Some("-[NSString reversed]"));
    /// ```
    #[must_use]
    pub fn full_name_without_category(&self) -> Option<String>
    {
        self.category?;
        let marker = match self.is_class_method {
            Some(true) => "+",
            Some(false) => "-",
            None => "",
        };
        Some(format!("{marker}[{} {}]", self.class_name, self.selector))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_instance_method()
    {
        let name = ObjCMethodName::parse("-[NSView initWithFrame:]", true).unwrap();
        assert_eq!(name.class_name(), "NSView");
        assert_eq!(name.selector(), "initWithFrame:");
        assert_eq!(name.category(), None);
        assert_eq!(name.is_class_method(), Some(false));
        assert_eq!(name.full_name_without_category(), None);
    }

    #[test]
    fn test_class_method_with_category()
    {
        let name = ObjCMethodName::parse("+[Foo(Bar) make:with:]", true).unwrap();
        assert_eq!(name.class_name(), "Foo");
        assert_eq!(name.category(), Some("Bar"));
        assert_eq!(name.selector(), "make:with:");
        assert_eq!(name.full_name_without_category().as_deref(), Some("+[Foo make:with:]"));
    }

    #[test]
    fn test_strictness()
    {
        assert!(ObjCMethodName::parse("[Foo bar]", true).is_none());
        assert!(ObjCMethodName::parse("[Foo bar]", false).is_some());
    }

    #[test]
    fn test_rejects_non_objc()
    {
        assert!(ObjCMethodName::parse("A::foo()", false).is_none());
        assert!(ObjCMethodName::parse("-[Foo]", true).is_none());
        assert!(ObjCMethodName::parse("", true).is_none());
    }
}
