use crate::{
    ast::{Expr, NodeId, Stmt, StmtKind},
    lexer, parser, resolve,
    type_checker::{self, CheckOptions},
    types::Type,
    util::fmt::tree,
};

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str, CheckOptions),
    CheckerExpr(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    TreeError(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    match test {
        Test::ParserProgram(input) => match parser::parse(&lexer::lex(input, "")) {
            Ok(prog) => (tree::print_program_string(&prog, None), vec![]),
            Err(error) => (String::new(), vec![error.to_string()]),
        },
        Test::ParserExpr(input) => match parser::parse_expr(&lexer::lex(input, "")) {
            Ok(expr) => (tree::print_expr_string(&expr, None), vec![]),
            Err(error) => (String::new(), vec![error.to_string()]),
        },
        Test::CheckerProgram(input, options) => {
            let prog = match parser::parse(&lexer::lex(input, "")) {
                Ok(prog) => prog,
                Err(error) => return (String::new(), vec![error.to_string()]),
            };
            let resolution = resolve::resolve(&prog);
            match type_checker::check(&prog, &resolution, options) {
                Ok(types) => (tree::print_program_string(&prog, Some(&types)), vec![]),
                Err(error) => {
                    let tree = tree::print_program_string(&prog, None);
                    (tree, vec![error.to_string()])
                }
            }
        }
        Test::CheckerExpr(input) => {
            let expr = match parser::parse_expr(&lexer::lex(input, "")) {
                Ok(expr) => expr,
                Err(error) => return (String::new(), vec![error.to_string()]),
            };
            let prog = [from_expr_to_program(expr)];
            let resolution = resolve::resolve(&prog);
            let StmtKind::Let { value, .. } = &prog[0].kind else {
                unreachable!();
            };
            match type_checker::check(&prog, &resolution, CheckOptions::default()) {
                Ok(types) => (tree::print_expr_string(value, Some(&types)), vec![]),
                Err(error) => {
                    let tree = tree::print_expr_string(value, None);
                    (tree, vec![error.to_string()])
                }
            }
        }
    }
}

/// Wraps an expression in `let _: any = <expr>` so it can be checked as a
/// program.
fn from_expr_to_program(expr: Expr) -> Stmt {
    Stmt {
        id: NodeId(u32::MAX),
        location: expr.location.clone(),
        kind: StmtKind::Let {
            name: "_".into(),
            ty: Type::ANY,
            value: expr,
            mutable: false,
        },
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::TreeError(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let source: &'static str = ::indoc::indoc! { $source };
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, tree_error, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeError(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram(
            $source,
            crate::type_checker::CheckOptions::default(),
        )
    };
    (@@get_test(checker, strict_program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram(
            $source,
            crate::type_checker::CheckOptions { strict_names: true },
        )
    };
    (@@get_test(checker, expr), $source:expr) => {
        crate::util::test_utils::Test::CheckerExpr($source)
    };
}
pub(crate) use tree_tests;
