use stemforge_core::codec::{
    SPEECH_SAMPLE_RATE, decode_pcm16, decode_speech_base64, decode_wav, encode_wav, float_to_pcm16,
};
use stemforge_core::dsp::AudioBuffer;

fn data_chunk(wav: &[u8]) -> &[u8] {
    &wav[44..]
}

#[test]
fn container_round_trip_is_lossless() {
    let left: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.013).sin() * 0.9).collect();
    let right: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.007).cos() - 0.5).collect();
    let original = AudioBuffer::from_channels(vec![left, right], 44_100);

    let first = encode_wav(&original).unwrap();
    let decoded = decode_wav(&first).unwrap();
    let second = encode_wav(&decoded).unwrap();
    assert_eq!(first, second);

    let third = encode_wav(&decode_wav(&second).unwrap()).unwrap();
    assert_eq!(second, third);
}

#[test]
fn full_scale_and_clipping() {
    let buffer = AudioBuffer::mono(vec![1.0, -1.0, 1.5, -1.5, 0.0], 8000);
    let wav = encode_wav(&buffer).unwrap();
    let samples: Vec<i16> = data_chunk(&wav)
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples, vec![32767, -32768, 32767, -32768, 0]);
}

#[test]
fn speech_stream_decodes_to_unit_floats() {
    let codes: [i16; 5] = [0, 1, -1, i16::MAX, i16::MIN];
    let bytes: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
    let buffer = decode_pcm16(&bytes, SPEECH_SAMPLE_RATE, 1).unwrap();
    assert_eq!(buffer.len(), codes.len());
    for (&code, &sample) in codes.iter().zip(buffer.channel(0)) {
        assert_eq!(sample, code as f32 / 32768.0);
        assert!((-1.0..1.0).contains(&sample));
    }
    // negative codes survive re-encoding exactly
    assert_eq!(float_to_pcm16(buffer.channel(0)[2]), -1);
    assert_eq!(float_to_pcm16(buffer.channel(0)[4]), i16::MIN);
}

#[test]
fn positive_speech_codes_drop_one_step_then_hold() {
    let codes: [i16; 3] = [16384, 1, i16::MAX];
    let bytes: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
    let speech = decode_pcm16(&bytes, SPEECH_SAMPLE_RATE, 1).unwrap();
    let reencoded: Vec<i16> = speech.channel(0).iter().map(|&s| float_to_pcm16(s)).collect();
    assert_eq!(reencoded, vec![16383, 0, 32766]);

    let wav = encode_wav(&speech).unwrap();
    let again = encode_wav(&decode_wav(&wav).unwrap()).unwrap();
    assert_eq!(wav, again);
}

#[test]
fn stereo_pcm_is_deinterleaved() {
    let codes: [i16; 4] = [100, -100, 200, -200];
    let bytes: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
    let buffer = decode_pcm16(&bytes, 24_000, 2).unwrap();
    assert_eq!(buffer.num_channels(), 2);
    assert_eq!(buffer.len(), 2);
    assert!(buffer.channel(0).iter().all(|&s| s > 0.0));
    assert!(buffer.channel(1).iter().all(|&s| s < 0.0));
}

#[test]
fn speech_payload_to_wav() {
    use base64::Engine as _;
    let bytes: Vec<u8> = (0..480i16).flat_map(|i| (i * 50).to_le_bytes()).collect();
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    let speech = decode_speech_base64(&payload).unwrap();
    assert_eq!(speech.sample_rate, 24_000);
    assert!((speech.duration_seconds() - 0.02).abs() < 1e-9);

    let wav = encode_wav(&speech).unwrap();
    let back = decode_wav(&wav).unwrap();
    assert_eq!(back.num_channels(), 1);
    assert_eq!(back.len(), 480);
}
