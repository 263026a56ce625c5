use anyhow::{Context, Result, bail};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::tree::Tree;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MatrixFormat {
    /// Full square matrix.
    #[default]
    Matrix,
    /// One `row  column  value` line per entry.
    List,
    /// Upper triangle including the diagonal.
    Triangular,
}

/// Sample names from file names, with a trailing `.jplace` removed.
pub fn sample_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            let name = p
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string());
            match name.strip_suffix(".jplace") {
                Some(stem) if !stem.is_empty() => stem.to_string(),
                _ => name,
            }
        })
        .collect()
}

/// `out_dir/{prefix}{infix}.{ext}`.
pub fn output_path(out_dir: &Path, prefix: &str, infix: &str, ext: &str) -> PathBuf {
    out_dir.join(format!("{prefix}{infix}.{ext}"))
}

/// Fails if any of `paths` exists and overwriting is not allowed.
pub fn check_nonexistent(paths: &[PathBuf], allow_overwrite: bool) -> Result<()> {
    if allow_overwrite {
        return Ok(());
    }
    for p in paths {
        if p.exists() {
            bail!(
                "output file {} already exists (use --allow-file-overwriting)",
                p.display()
            );
        }
    }
    Ok(())
}

pub fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    Ok(BufWriter::new(f))
}

/// Writes a square matrix as tab separated text.
///
/// `names` labels rows and columns; `None` omits labels (the list format
/// falls back to indices).
pub fn write_matrix<W: Write>(
    out: &mut W,
    matrix: &Array2<f64>,
    names: Option<&[String]>,
    format: MatrixFormat,
    corner: &str,
) -> Result<()> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        bail!("matrix is {}x{}, expected square", n, matrix.ncols());
    }
    if let Some(names) = names {
        if names.len() != n {
            bail!("{} labels for a {n}x{n} matrix", names.len());
        }
    }
    let label = |i: usize| -> String {
        names
            .map(|ns| ns[i].clone())
            .unwrap_or_else(|| i.to_string())
    };

    match format {
        MatrixFormat::Matrix | MatrixFormat::Triangular => {
            let triangular = format == MatrixFormat::Triangular;
            if let Some(names) = names {
                write!(out, "{corner}")?;
                for name in names {
                    write!(out, "\t{name}")?;
                }
                writeln!(out)?;
            }
            for i in 0..n {
                let mut first = true;
                if names.is_some() {
                    write!(out, "{}", label(i))?;
                    first = false;
                }
                let start = if triangular { i } else { 0 };
                for j in start..n {
                    if !first {
                        write!(out, "\t")?;
                    }
                    write!(out, "{}", matrix[(i, j)])?;
                    first = false;
                }
                writeln!(out)?;
            }
        }
        MatrixFormat::List => {
            writeln!(out, "row\tcolumn\tvalue")?;
            for i in 0..n {
                for j in 0..n {
                    writeln!(out, "{}\t{}\t{}", label(i), label(j), matrix[(i, j)])?;
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// One line per edge: index, `edge_num`, name of the node below the edge, mass.
pub fn write_edge_masses<W: Write>(out: &mut W, tree: &Tree, masses: &Array1<f64>) -> Result<()> {
    if masses.len() != tree.edge_count() {
        bail!(
            "{} masses for a tree with {} edges",
            masses.len(),
            tree.edge_count()
        );
    }
    writeln!(out, "edge_index\tedge_num\tnode\tmass")?;
    for (idx, (edge, mass)) in tree.edges().iter().zip(masses.iter()).enumerate() {
        let node = &tree.node(edge.secondary).name;
        writeln!(out, "{idx}\t{}\t{node}\t{mass}", edge.edge_num)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_matrix_npz(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut npz = NpzWriter::new(f);
    npz.add_array("nhd.npy", matrix)?;
    npz.finish()?;
    Ok(())
}

pub fn save_edge_masses_npz(path: &Path, tree: &Tree, masses: &Array1<f64>) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut npz = NpzWriter::new(f);
    npz.add_array("masses.npy", masses)?;
    let edge_nums: Array1<i64> = tree.edges().iter().map(|e| e.edge_num).collect();
    npz.add_array("edge_nums.npy", &edge_nums)?;
    npz.finish()?;
    Ok(())
}
