#![allow(dead_code)]

use git2::{Commit, Oid, Repository, Signature, Time};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// 一時ディレクトリに空のリポジトリを作成する
pub fn init_repo() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

/// ファイルを書き込み、指定した時刻の作成者でコミットする
pub fn commit_files(repo: &Repository, files: &[&str], when: i64, message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for file in files {
        let full = workdir.join(file);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, format!("{file} @ {message}\n")).unwrap();
        index.add_path(Path::new(file)).unwrap();
    }
    write_commit(repo, &mut index, when, message)
}

/// ファイルを削除してコミットする
pub fn remove_files(repo: &Repository, files: &[&str], when: i64, message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for file in files {
        fs::remove_file(workdir.join(file)).unwrap();
        index.remove_path(Path::new(file)).unwrap();
    }
    write_commit(repo, &mut index, when, message)
}

fn write_commit(repo: &Repository, index: &mut git2::Index, when: i64, message: &str) -> Oid {
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::new("tester", "tester@example.com", &Time::new(when, 0)).unwrap();

    let parents: Vec<Commit> = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&Commit> = parents.iter().collect();

    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parent_refs,
    )
    .unwrap()
}

/// 作業ツリーを介さずに、指定した親を持つコミットを作る
///
/// `files` はルート直下のファイル名と内容の組。HEADは動かさない。
pub fn commit_tree(
    repo: &Repository,
    files: &[(&str, &str)],
    parents: &[Oid],
    when: i64,
    message: &str,
) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in files {
        let blob = repo.blob(content.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let signature = Signature::new("tester", "tester@example.com", &Time::new(when, 0)).unwrap();

    let parents: Vec<Commit> = parents
        .iter()
        .map(|oid| repo.find_commit(*oid).unwrap())
        .collect();
    let parent_refs: Vec<&Commit> = parents.iter().collect();

    repo.commit(None, &signature, &signature, message, &tree, &parent_refs)
        .unwrap()
}
