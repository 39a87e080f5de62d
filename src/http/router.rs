//! Regex based router. Routes are tested in the order they were added.

use regex::Regex;

type ParamsConverter<T> = dyn Fn(Vec<&str>) -> Option<T> + Send + Sync;

pub struct RouteParser<T> {
    regex_and_converters: Vec<(Regex, Box<ParamsConverter<T>>)>,
}

impl<T> Default for RouteParser<T> {
    fn default() -> Self {
        Self {
            regex_and_converters: Vec::new(),
        }
    }
}

impl<T> RouteParser<T> {
    /// Adds a route without params. Panics on invalid regex, routes are static.
    pub fn add_route<F>(&mut self, regex_pattern: &str, f: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.add_route_with_params(regex_pattern, move |_| Some(f()));
    }

    /// Adds a route whose regex captures are passed to `converter`
    pub fn add_route_with_params<F>(&mut self, regex_pattern: &str, converter: F)
    where
        F: Fn(Vec<&str>) -> Option<T> + Send + Sync + 'static,
    {
        let regex = Regex::new(regex_pattern).unwrap_or_else(|e| panic!("Invalid route regex {}: {}", regex_pattern, e));
        self.regex_and_converters.push((regex, Box::new(converter)));
    }

    /// First route matching `route`, None if nothing matches or params don't parse
    pub fn test(&self, route: &str) -> Option<T> {
        self.regex_and_converters.iter().find_map(|(regex, converter)| {
            regex.captures(route).and_then(|captures| {
                let params = captures.iter().skip(1).filter_map(|m| m.map(|m| m.as_str())).collect::<Vec<_>>();
                converter(params)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Route {
        Items,
        Item { id: u32 },
        ItemAction { id: u32, action: String },
    }

    fn parser() -> RouteParser<Route> {
        let mut parser = RouteParser::default();
        parser.add_route(r"^/items$", || Route::Items);
        parser.add_route_with_params(r"^/items/(\d+)$", |params| {
            params.get(0).and_then(|id| id.parse().ok()).map(|id| Route::Item { id })
        });
        parser.add_route_with_params(r"^/items/(\d+)/(\w+)$", |params| {
            let id = params.get(0).and_then(|id| id.parse().ok())?;
            let action = params.get(1)?.to_string();
            Some(Route::ItemAction { id, action })
        });
        parser
    }

    #[test]
    fn test_matches_routes() {
        let parser = parser();
        assert_eq!(parser.test("/items"), Some(Route::Items));
        assert_eq!(parser.test("/items/42"), Some(Route::Item { id: 42 }));
        assert_eq!(
            parser.test("/items/7/archive"),
            Some(Route::ItemAction {
                id: 7,
                action: "archive".to_string()
            })
        );
    }

    #[test]
    fn test_rejects_unknown_routes() {
        let parser = parser();
        assert_eq!(parser.test("/items/"), None);
        assert_eq!(parser.test("/items/abc"), None);
        assert_eq!(parser.test("/other"), None);
        assert_eq!(parser.test("/items/99999999999999"), None);
    }
}
