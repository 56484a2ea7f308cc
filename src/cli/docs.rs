//! Documentation content for the qql CLI

use super::CliError;

/// Available documentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Statements,
    Conditionals,
    Functions,
    Operators,
    Builtins,
    Types,
}

impl DocCategory {
    pub const ALL: [DocCategory; 6] = [
        DocCategory::Statements,
        DocCategory::Conditionals,
        DocCategory::Functions,
        DocCategory::Operators,
        DocCategory::Builtins,
        DocCategory::Types,
    ];

    /// Parse category name from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "statements" | "statement" | "crud" => Some(Self::Statements),
            "conditionals" | "conditional" | "if" | "filters" => Some(Self::Conditionals),
            "functions" | "function" | "func" => Some(Self::Functions),
            "operators" | "ops" => Some(Self::Operators),
            "builtins" | "builtin" | "regexp" => Some(Self::Builtins),
            "types" | "type" | "datatypes" => Some(Self::Types),
            _ => None,
        }
    }

    pub fn content(&self) -> &'static str {
        match self {
            DocCategory::Statements => STATEMENTS_DOC,
            DocCategory::Conditionals => CONDITIONALS_DOC,
            DocCategory::Functions => FUNCTIONS_DOC,
            DocCategory::Operators => OPERATORS_DOC,
            DocCategory::Builtins => BUILTINS_DOC,
            DocCategory::Types => TYPES_DOC,
        }
    }
}

/// Get the docs overview (category listing)
pub fn get_docs_overview() -> &'static str {
    r#"QQL DOCUMENTATION

QQL is a small query language for creating, filling, reading, changing and
dropping tables addressed as database.table, with user-defined functions and
conditional row filters.

DOCUMENTATION CATEGORIES

  statements        generate, append, get, change, delete
  conditionals      if ... then: ... end as nested row filters and guards
  functions         generate ... begin ... end, return, calls
  operators         Comparison, logical and arithmetic operators
  builtins          regexp, upper, lower, trim, length, abs
  types             Data types and the SQL to QQL type mapping

QUICK REFERENCE

  generate db.t (id int key, name string)    Create a table
  append db.t (id, name) -> (1, "John")      Insert a row
  get db.t->*                                Read every column
  change db.t (name = "Jane")                Update rows
  delete db.t (id = 1)                       Delete rows
  delete db.t->name                          Drop a column
  delete db.t                                Drop a table

Run 'qql doc <category>' for detailed documentation.
"#
}

/// Get documentation for a specific category
pub fn get_doc_category(name: &str) -> Result<&'static str, CliError> {
    DocCategory::from_name(name)
        .map(|category| category.content())
        .ok_or_else(|| CliError::UnknownCategory(name.to_string()))
}

const STATEMENTS_DOC: &str = r#"STATEMENTS - Tables and Rows

Statements are separated by newlines; ';' is an optional separator.
A '#' at the start of a line begins a comment.

CREATE A TABLE
  generate db.table (column type [key], ...)

    Example:
      generate shop.users (id int key, name string, age int)

    Constraints:
      - Column names are unique per table
      - At most one column is the key; key values are unique and never empty
      - Generating an existing table is an error

INSERT A ROW
  append db.table (columns) -> (values)

    Example:
      append shop.users (id, name, age) -> (1, "John", 30)

    Constraints:
      - One value per listed column
      - Columns not listed are stored as empty
      - Values are converted to the column type

READ ROWS
  get db.table            Every column
  get db.table->*         Every column
  get db.table->col       One column
  get db.table -> (a, b)  Selected columns
  get <expression>        A single value, e.g. get shop.add(1, 2)

    Rows are produced lazily in insertion order.

UPDATE ROWS
  change db.table (column = expression, ...)

    Example:
      change shop.users (age = age + 1)

    Every assignment reads the row as it was before the change, and the
    row is written only when all assignments succeed. Without an enclosing
    condition every row is changed.

DELETE
  delete db.table (condition)    Delete matching rows
  delete db.table->column        Drop a column
  delete db.table                Drop the table

VARIABLES
  name [type] = expression

    Example:
      limit int = 18
      if age > limit then:
          get shop.users->name
      end
"#;

const CONDITIONALS_DOC: &str = r#"CONDITIONALS - Row Filters and Guards

ROW FILTERS
  if <condition> then:
      ...
  end

    A condition over table columns does not branch. It narrows the rows
    seen by every get, change and delete inside the block. Nested blocks
    combine their conditions with and:

      if age > 18 then:
          if regexp(name) = "^J" then:
              get shop.users->name
          end
      end

    is the same as

      if age > 18 and regexp(name) = "^J" then:
          get shop.users->name
      end

    Inside a row filter a bare 'delete db.table' deletes the matching rows
    instead of dropping the table. Appends, assignments and generate are
    not allowed inside a row filter.

    Bare names resolve to columns first, then to variables.
    db.table->col may be used to name the filtered table's column.

GUARDS
    A condition that only mentions variables and literals is evaluated once.
    The block runs when it holds, in its own variable scope:

      debug bool = true
      if debug then:
          get shop.users->*
      end

EMPTY
    A condition that evaluates to empty counts as false.
"#;

const FUNCTIONS_DOC: &str = r#"FUNCTIONS - User-Defined Functions

DECLARE
  generate db.func (param type, ...) [-> type] begin
      ...
      return expression
  end

    Example:
      generate shop.add (a int, b int) -> int begin
          c int = a + b
          return c
      end

CALL
  get shop.add(1, 2)    => 3

    Arguments are converted to the parameter types, and the result to the
    declared return type. A body that ends without return gives empty.

    Functions are identified by name and arity, so db.f(a) and db.f(a, b)
    may coexist. Redeclaring the same name and arity is an error.

SCOPE
    A body sees its parameters and its own variables only. Every call gets
    a fresh scope that is discarded when the call returns.

SIDE EFFECTS
    A body may append, change and delete rows. Such a function cannot be
    called from a row filter or a change assignment.

    Bodies are checked again whenever a table is generated or deleted. A
    body that no longer fits its tables cannot be called until it does.

    Calls nest at most 64 deep by default (qql run --max-call-depth).
"#;

const OPERATORS_DOC: &str = r#"OPERATORS - Comparison, Logical, and Arithmetic

COMPARISON OPERATORS
  =     Equal
  !=    Not equal
  <     Less than
  >     Greater than
  <=    Less than or equal
  >=    Greater than or equal

  Constraints:
    - Comparisons do not chain: a < b < c is a syntax error
    - Only values of the same family compare: numbers (int, float, year),
      text (string, enum), otherwise the same type
    - empty equals only empty and is never ordered

LOGICAL OPERATORS
  and   Logical AND (short-circuit)
  or    Logical OR (short-circuit)
  not   Logical NOT (prefix)
  !     Logical NOT (prefix)

ARITHMETIC OPERATORS
  +     Addition / String concatenation
  -     Subtraction and negation
  *     Multiplication
  /     Division
  %     Modulo (remainder)

  Type behavior:
    int + int      = int
    int + float    = float (computed exactly, then rounded)
    string + string = string

  Division special case:
    100 / 4  => 25      (exact: returns int)
    100 / 3  => 33.333  (inexact: returns float)

  Constraints:
    - Division or modulo by zero raises an error
    - int overflow raises an error
    - Arithmetic with empty gives empty

OPERATOR PRECEDENCE (highest to lowest)
  1. not ! -           Unary
  2. * / %             Multiplicative
  3. + -               Additive
  4. = != < > <= >=    Comparison
  5. and               Logical AND
  6. or                Logical OR

  Use parentheses to override: (a or b) and c
"#;

const BUILTINS_DOC: &str = r#"BUILTINS - Built-in Functions

  regexp(text, pattern)    true when text matches the regular expression
  regexp(text) = pattern   Same match, written as a comparison
  regexp(text) != pattern  Negated match
  upper(text)              Upper case
  lower(text)              Lower case
  trim(text)               Strip surrounding whitespace
  length(text)             Number of characters
  abs(number)              Absolute value

  Example:
    if regexp(name) = "^J.*" then:
        if id > 20 then:
            get db.table->age
        end
    end

  Constraints:
    - An invalid pattern is an error
    - empty never matches and passes through the text functions
"#;

const TYPES_DOC: &str = r#"TYPES - Data Types and Conversion

DATA TYPES
  int        64-bit signed integer          42, -17
  float      64-bit floating point          3.14, 1.0
  string     UTF-8 text                     "John", 'John'
  bool       true or false (alias boolean)  true
  date       Calendar date                  date"2024-01-31"
  time       Time of day                    time"12:30:00"
  datetime   Date and time                  datetime"2024-01-31 12:30:00"
  year       Year 0-9999                    2024
  object     Binary payload                 "bytes"
  enum       Text label                     "red"
  set        Set of text labels             {"a", "b"}
  json       JSON document                  "{\"k\": 1}"
  empty      The null value                 empty

SQL TO QQL
  int, tinyint, smallint, mediumint, bigint   int
  float, double, decimal, numeric             float
  char, varchar, text                         string
  date                                        date
  time                                        time
  datetime, timestamp                         datetime
  year                                        year
  binary, varbinary, blob                     object
  enum                                        enum
  set                                         set
  json                                        json
  boolean, bool                               bool
  null                                        empty

CONVERSION
  Values are converted to the declared column, parameter, variable or
  return type:
    - int is accepted where float is expected
    - strings are parsed for date, time, datetime and json
    - a date is accepted where datetime is expected
    - empty is accepted everywhere

  Literals compared with a typed column take the column's type:
    if birthday = "2024-01-31" then: ...
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_resolves() {
        for category in DocCategory::ALL {
            let name = format!("{category:?}").to_lowercase();
            assert_eq!(DocCategory::from_name(&name), Some(category));
            assert!(!category.content().is_empty());
        }
    }

    #[test]
    fn test_unknown_category() {
        assert!(matches!(
            get_doc_category("joins"),
            Err(CliError::UnknownCategory(name)) if name == "joins"
        ));
    }
}
